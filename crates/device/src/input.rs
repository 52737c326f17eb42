//! Argument builders for `adb shell` input and package commands.

/// Escape text for `input text`: quotes are backslash-escaped and spaces
/// become `%s`.
pub fn escape_input_text(text: &str) -> String {
    text.replace('\'', "\\'").replace(' ', "%s")
}

/// Prefix a key name with `KEYCODE_` unless it already has it.
pub fn normalize_keycode(keycode: &str) -> String {
    let keycode = keycode.trim();
    if keycode.starts_with("KEYCODE_") {
        keycode.to_string()
    } else {
        format!("KEYCODE_{keycode}")
    }
}

/// Package names from `pm list packages` output.
pub fn parse_packages(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(|pkg| pkg.trim().to_string())
        .filter(|pkg| !pkg.is_empty())
        .collect()
}

/// The launcher component from `cmd package resolve-activity --brief`.
///
/// The first line is the resolved priority/flags, the second the
/// `package/activity` component.
pub fn parse_resolved_activity(stdout: &str) -> Option<String> {
    if stdout.contains("No activity found") {
        return None;
    }
    stdout
        .trim()
        .lines()
        .nth(1)
        .map(str::trim)
        .filter(|line| line.contains('/'))
        .map(String::from)
}

/// Split a free-form adb command line into arguments.
///
/// Single and double quotes group words; nothing is expanded by a shell.
pub fn split_command_line(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in command.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        args.push(current);
    }
    args
}
