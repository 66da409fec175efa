use serde::Serialize;

/// Commands a level script may call on `map`, with their help text.
pub const REFERENCE_COMMANDS: &[(&str, &str)] = &[
    ("map.get_width", "Returns the width of the map in cells."),
    ("map.get_height", "Returns the height of the map in cells."),
    ("map.place_player", "Places the player at (x, y). Only once per level."),
    ("map.place_object", "Places an object of the given type at (x, y)."),
    ("map.get_object_type_at", "Returns the type of the object at (x, y), or \"\"."),
    ("map.count_objects", "Returns how many objects of the given type are on the map."),
    ("map.get_player_x", "Returns the player's x coordinate."),
    ("map.get_player_y", "Returns the player's y coordinate."),
    ("map.has_item", "Returns true if the player carries the given item."),
    ("map.display_chapter", "Shows a chapter title above the map."),
    ("map.write_status", "Writes a line to the status bar."),
    ("map.validate_at_most", "Fails validation if there are more than n objects of a type."),
    ("map.validate_at_least", "Fails validation if there are fewer than n objects of a type."),
    ("map.validate_exactly", "Fails validation unless there are exactly n objects of a type."),
];

#[derive(Clone, Debug, Serialize)]
pub struct CommandHelp {
    pub name: String,
    pub description: String,
}

pub fn describe(name: &str) -> Option<&'static str> {
    REFERENCE_COMMANDS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
}

pub fn all_command_names() -> Vec<String> {
    REFERENCE_COMMANDS.iter().map(|(n, _)| n.to_string()).collect()
}

pub fn help_for(names: &[String]) -> Vec<CommandHelp> {
    names
        .iter()
        .map(|name| CommandHelp {
            name: name.clone(),
            description: describe(name).unwrap_or_default().to_string(),
        })
        .collect()
}

/// Reference commands called as methods in `source`, ordered by first call.
pub fn referenced_commands(source: &str) -> Vec<String> {
    let mut found: Vec<(usize, &str)> = REFERENCE_COMMANDS
        .iter()
        .filter_map(|(name, _)| {
            let method = name.rsplit('.').next().unwrap_or(name);
            first_method_call(source, method).map(|pos| (pos, *name))
        })
        .collect();
    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, name)| name.to_string()).collect()
}

/// Byte offset of the first `.method(` call, whitespace allowed around the name.
fn first_method_call(source: &str, method: &str) -> Option<usize> {
    word_token_positions(source, method).find(|&pos| {
        let before = source[..pos].trim_end();
        let after = source[pos + method.len()..].trim_start();
        before.ends_with('.') && after.starts_with('(')
    })
}

pub fn contains_word_token(source: &str, token: &str) -> bool {
    word_token_positions(source, token).next().is_some()
}

fn word_token_positions<'a>(source: &'a str, token: &'a str) -> impl Iterator<Item = usize> + 'a {
    source
        .match_indices(token)
        .map(|(pos, _)| pos)
        .filter(move |&pos| {
            let prev_ok = source[..pos].chars().next_back().is_none_or(|c| !is_word_char(c));
            let next_ok = source[pos + token.len()..]
                .chars()
                .next()
                .is_none_or(|c| !is_word_char(c));
            !token.is_empty() && prev_ok && next_ok
        })
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_tokens_respect_boundaries() {
        assert!(contains_word_token("let x = eval(\"1\");", "eval"));
        assert!(!contains_word_token("let evaluate = 1;", "eval"));
        assert!(!contains_word_token("let my_eval = 1;", "eval"));
        assert!(contains_word_token("Fn(\"f\")", "Fn"));
    }

    #[test]
    fn referenced_commands_follow_first_call_order() {
        let code = r#"
            map.place_object(1, 1, "block");
            let w = map.get_width();
            map.place_object(2, 1, "block");
            map . place_player (0, 0);
            // get_height is only mentioned, never called
        "#;
        assert_eq!(
            referenced_commands(code),
            vec!["map.place_object", "map.get_width", "map.place_player"]
        );
    }

    #[test]
    fn every_reference_command_has_help() {
        let names = all_command_names();
        assert_eq!(names.len(), REFERENCE_COMMANDS.len());
        assert!(help_for(&names).iter().all(|h| !h.description.is_empty()));
    }
}
