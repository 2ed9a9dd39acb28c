//! Splitting of directive text into arguments.

/// Split a directive into its parts.
///
/// Parts are separated by runs of spaces, tabs or newlines. Double quotes
/// group text (including whitespace) into one part, and an empty pair of
/// quotes still yields a part. Inside quotes a backslash escapes the next
/// character: `\n` and `\t` become newline and tab, anything else (most
/// usefully `\"`) is taken literally. Outside quotes a backslash is an
/// ordinary character.
///
/// ```
/// use cellgo_synth::split_cmd;
///
/// assert_eq!(split_cmd(r#"args --text "hello world""#), vec!["args", "--text", "hello world"]);
/// ```
pub fn split_cmd(cmd: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut part = String::new();
    let mut part_started = false;
    let mut in_quotes = false;

    let mut chars = cmd.chars();
    while let Some(c) = chars.next() {
        if !in_quotes && matches!(c, ' ' | '\t' | '\n') {
            if part_started {
                parts.push(std::mem::take(&mut part));
            }
            part_started = false;
            continue;
        }

        if c == '"' {
            if !in_quotes {
                // An opening quote starts a part even if nothing follows.
                part_started = true;
            }
            in_quotes = !in_quotes;
            continue;
        }

        let c = if c == '\\' && in_quotes {
            match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some(other) => other,
                // Dangling escape at end of input.
                None => break,
            }
        } else {
            c
        };

        part.push(c);
        part_started = true;
    }

    if part_started {
        parts.push(part);
    }
    parts
}
