//! Commands accepted on stdin while a run is paused.

use arcscope_core::api::{GameAction, ManualAction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Continue(String),
    Action(ManualAction),
    Frame(usize),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  continue <message>   resume the run with guidance for the agent
  action <TOKEN> [x y] send one action (RESET, ACTION1..ACTION7; ACTION6 needs x y)
  frame <n>            show frame n (1-based)
  status               print the current state
  quit                 stop and print the report";

pub fn parse_command(line: &str) -> Result<OperatorCommand, String> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb.to_ascii_lowercase().as_str() {
        "continue" | "c" => Ok(OperatorCommand::Continue(rest.to_string())),
        "action" | "a" => parse_action(rest).map(OperatorCommand::Action),
        "frame" | "f" => {
            let n: usize = rest
                .parse()
                .map_err(|_| format!("frame expects a number, got {rest:?}"))?;
            if n == 0 {
                return Err("frames are numbered from 1".to_string());
            }
            Ok(OperatorCommand::Frame(n - 1))
        }
        "status" | "s" => Ok(OperatorCommand::Status),
        "help" | "h" | "?" => Ok(OperatorCommand::Help),
        "quit" | "q" | "exit" => Ok(OperatorCommand::Quit),
        "" => Err("empty command".to_string()),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_action(rest: &str) -> Result<ManualAction, String> {
    let mut parts = rest.split_whitespace();
    let token = parts.next().ok_or("action expects a token")?;
    let action: GameAction = token.parse()?;

    let coords: Vec<u32> = parts
        .map(|p| p.parse().map_err(|_| format!("invalid coordinate: {p}")))
        .collect::<Result<_, _>>()?;
    let action = match coords.as_slice() {
        [] => ManualAction::new(action),
        [x, y] => ManualAction::at(action, *x, *y),
        _ => return Err("coordinates are `x y`".to_string()),
    };
    action.validate().map_err(|e| e.to_string())?;
    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_continue_keeps_message() {
        assert_eq!(
            parse_command("continue  try action 4 next "),
            Ok(OperatorCommand::Continue("try action 4 next".to_string()))
        );
        assert_eq!(
            parse_command("c"),
            Ok(OperatorCommand::Continue(String::new()))
        );
    }

    #[test]
    fn test_parse_action_with_and_without_coordinates() {
        assert_eq!(
            parse_command("action action_4"),
            Ok(OperatorCommand::Action(ManualAction::new(GameAction::Action4)))
        );
        assert_eq!(
            parse_command("a 6 10 12"),
            Ok(OperatorCommand::Action(ManualAction::at(
                GameAction::Action6,
                10,
                12
            )))
        );
        assert!(parse_command("action ACTION6").is_err());
        assert!(parse_command("action ACTION1 1 2").is_err());
        assert!(parse_command("action jump").is_err());
        assert!(parse_command("action ACTION6 1").is_err());
    }

    #[test]
    fn test_parse_frame_is_one_based() {
        assert_eq!(parse_command("frame 3"), Ok(OperatorCommand::Frame(2)));
        assert!(parse_command("frame 0").is_err());
        assert!(parse_command("frame x").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_command("QUIT"), Ok(OperatorCommand::Quit));
        assert_eq!(parse_command("?"), Ok(OperatorCommand::Help));
        assert!(parse_command("   ").is_err());
        assert!(parse_command("dance").is_err());
    }
}
