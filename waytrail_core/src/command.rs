//! `/route` command surface: parsing, usage help and completion.
//!
//! Subcommand keywords are case-insensitive; route names are passed
//! through untouched.

use crate::effect::EffectKind;
use crate::error::RouteError;
use std::str::FromStr;

pub const USAGE: &str = "Usage: /route <create|delete|list|seteffect|follow|edit>";
pub const USAGE_CREATE: &str = "Usage: /route create <name> [effect]";
pub const USAGE_DELETE: &str = "Usage: /route delete <name>";
pub const USAGE_SET_EFFECT: &str = "Usage: /route seteffect <route> <effect>";
pub const USAGE_FOLLOW: &str = "Usage: /route follow <start <route>|pause|unpause|end>";
pub const USAGE_EDIT: &str = "Usage: /route edit <select <route>|deselect|point add|clear|linefollowstart|linefollowpause|linefollowunpause>";

const TOP_LEVEL: [&str; 6] = ["create", "delete", "list", "seteffect", "follow", "edit"];
const FOLLOW: [&str; 4] = ["start", "pause", "unpause", "end"];
const EDIT: [&str; 7] = [
    "select",
    "deselect",
    "point",
    "clear",
    "linefollowstart",
    "linefollowpause",
    "linefollowunpause",
];

/// Playback subcommands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowCommand {
    Start { route: String },
    Pause,
    Unpause,
    End,
}

/// Capture subcommands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditCommand {
    Select { route: String },
    Deselect,
    AddPoint,
    Clear,
    LineFollowStart,
    LineFollowPause,
    LineFollowUnpause,
}

/// A parsed `/route` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteCommand {
    Create { name: String, effect: Option<String> },
    Delete { name: String },
    List,
    SetEffect { route: String, effect: String },
    Follow(FollowCommand),
    Edit(EditCommand),
    Help,
}

/// Parses command arguments (everything after `/route`).
///
/// # Returns
/// * `Err(RouteError::Usage)` - the most specific usage line for the input
pub fn parse(args: &[&str]) -> Result<RouteCommand, RouteError> {
    let Some(first) = args.first() else {
        return Err(RouteError::usage(USAGE));
    };
    let arg = |i: usize| args.get(i).map(|s| s.to_string());

    match first.to_lowercase().as_str() {
        "help" => Ok(RouteCommand::Help),
        "create" => {
            let name = arg(1).ok_or_else(|| RouteError::usage(USAGE_CREATE))?;
            Ok(RouteCommand::Create { name, effect: arg(2) })
        }
        "delete" => {
            let name = arg(1).ok_or_else(|| RouteError::usage(USAGE_DELETE))?;
            Ok(RouteCommand::Delete { name })
        }
        "list" => Ok(RouteCommand::List),
        "seteffect" | "setparticle" => match (arg(1), arg(2)) {
            (Some(route), Some(effect)) => Ok(RouteCommand::SetEffect { route, effect }),
            _ => Err(RouteError::usage(USAGE_SET_EFFECT)),
        },
        "follow" => parse_follow(&args[1..]).map(RouteCommand::Follow),
        "edit" => parse_edit(&args[1..]).map(RouteCommand::Edit),
        _ => Err(RouteError::usage(format!("Unknown subcommand {:?}. {}", first, USAGE))),
    }
}

fn parse_follow(args: &[&str]) -> Result<FollowCommand, RouteError> {
    let usage = || RouteError::usage(USAGE_FOLLOW);
    let sub = args.first().ok_or_else(usage)?;

    match sub.to_lowercase().as_str() {
        "start" => {
            let route = args.get(1).ok_or_else(usage)?;
            Ok(FollowCommand::Start {
                route: route.to_string(),
            })
        }
        "pause" => Ok(FollowCommand::Pause),
        "unpause" | "resume" => Ok(FollowCommand::Unpause),
        "end" | "stop" => Ok(FollowCommand::End),
        _ => Err(usage()),
    }
}

fn parse_edit(args: &[&str]) -> Result<EditCommand, RouteError> {
    let usage = || RouteError::usage(USAGE_EDIT);
    let sub = args.first().ok_or_else(usage)?;

    match sub.to_lowercase().as_str() {
        "select" => {
            let route = args.get(1).ok_or_else(usage)?;
            Ok(EditCommand::Select {
                route: route.to_string(),
            })
        }
        "deselect" => Ok(EditCommand::Deselect),
        "point" => match args.get(1) {
            Some(action) if action.eq_ignore_ascii_case("add") => Ok(EditCommand::AddPoint),
            _ => Err(usage()),
        },
        "clear" => Ok(EditCommand::Clear),
        "linefollowstart" => Ok(EditCommand::LineFollowStart),
        "linefollowpause" => Ok(EditCommand::LineFollowPause),
        "linefollowunpause" => Ok(EditCommand::LineFollowUnpause),
        _ => Err(usage()),
    }
}

impl FromStr for RouteCommand {
    type Err = RouteError;

    /// Parses a whole line; a leading `/route` or `route` is optional.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens: Vec<&str> = line.split_whitespace().collect();
        if let Some(first) = tokens.first() {
            if first.eq_ignore_ascii_case("/route") || first.eq_ignore_ascii_case("route") {
                tokens.remove(0);
            }
        }
        parse(&tokens)
    }
}

/// Completion candidates for the last (possibly empty) argument.
///
/// `args` holds every argument typed so far, the last one being the word
/// under the cursor.
pub fn complete(args: &[&str], route_names: &[String]) -> Vec<String> {
    let Some((current, before)) = args.split_last() else {
        return words(&TOP_LEVEL);
    };
    let before: Vec<String> = before.iter().map(|s| s.to_lowercase()).collect();
    let before: Vec<&str> = before.iter().map(String::as_str).collect();

    let candidates = match before.as_slice() {
        [] => words(&TOP_LEVEL),
        ["follow"] => words(&FOLLOW),
        ["edit"] => words(&EDIT),
        ["edit", "point"] => words(&["add"]),
        ["delete"] | ["seteffect"] | ["setparticle"] => route_names.to_vec(),
        ["follow", "start"] | ["edit", "select"] => route_names.to_vec(),
        ["seteffect", _] | ["setparticle", _] | ["create", _] => {
            EffectKind::ALL.iter().map(|e| e.name().to_string()).collect()
        }
        _ => Vec::new(),
    };

    let prefix = current.to_lowercase();
    candidates
        .into_iter()
        .filter(|c| c.to_lowercase().starts_with(&prefix))
        .collect()
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec!["harbour".to_string(), "hill".to_string(), "Castle".to_string()]
    }

    #[test]
    fn test_parse_create() {
        assert_eq!(
            "/route create harbour".parse::<RouteCommand>().unwrap(),
            RouteCommand::Create {
                name: "harbour".into(),
                effect: None
            }
        );
        assert_eq!(
            parse(&["CREATE", "Harbour", "heart"]).unwrap(),
            RouteCommand::Create {
                name: "Harbour".into(),
                effect: Some("heart".into())
            }
        );
    }

    #[test]
    fn test_parse_follow_and_edit() {
        assert_eq!(
            parse(&["follow", "start", "hill"]).unwrap(),
            RouteCommand::Follow(FollowCommand::Start { route: "hill".into() })
        );
        assert_eq!(parse(&["follow", "UNPAUSE"]).unwrap(), RouteCommand::Follow(FollowCommand::Unpause));
        assert_eq!(parse(&["edit", "point", "add"]).unwrap(), RouteCommand::Edit(EditCommand::AddPoint));
        assert_eq!(
            parse(&["edit", "linefollowpause"]).unwrap(),
            RouteCommand::Edit(EditCommand::LineFollowPause)
        );
        assert_eq!(
            parse(&["setparticle", "hill", "crit"]).unwrap(),
            RouteCommand::SetEffect {
                route: "hill".into(),
                effect: "crit".into()
            }
        );
    }

    #[test]
    fn test_missing_arguments_give_specific_usage() {
        let usage = |args: &[&str]| match parse(args) {
            Err(RouteError::Usage(text)) => text,
            other => panic!("expected usage, got {:?}", other),
        };

        assert_eq!(usage(&[]), USAGE);
        assert_eq!(usage(&["create"]), USAGE_CREATE);
        assert_eq!(usage(&["follow"]), USAGE_FOLLOW);
        assert_eq!(usage(&["follow", "start"]), USAGE_FOLLOW);
        assert_eq!(usage(&["edit", "point"]), USAGE_EDIT);
        assert_eq!(usage(&["seteffect", "hill"]), USAGE_SET_EFFECT);
        assert!(usage(&["teleport"]).contains(USAGE));
    }

    #[test]
    fn test_complete_subcommands() {
        assert_eq!(complete(&[""], &names()).len(), TOP_LEVEL.len());
        assert_eq!(complete(&["f"], &names()), vec!["follow"]);
        assert_eq!(complete(&["edit", "line"], &names()).len(), 3);
        assert_eq!(complete(&["edit", "point", ""], &names()), vec!["add"]);
    }

    #[test]
    fn test_complete_route_names() {
        assert_eq!(complete(&["follow", "start", "h"], &names()), vec!["harbour", "hill"]);
        assert_eq!(complete(&["edit", "select", "c"], &names()), vec!["Castle"]);
        assert_eq!(complete(&["delete", ""], &names()).len(), 3);
    }

    #[test]
    fn test_complete_effects() {
        let effects = complete(&["seteffect", "hill", "so"], &names());
        assert_eq!(effects, vec!["SOUL_FIRE_FLAME"]);
        assert_eq!(complete(&["create", "new", ""], &names()).len(), EffectKind::ALL.len());
        assert!(complete(&["list", ""], &names()).is_empty());
    }
}
