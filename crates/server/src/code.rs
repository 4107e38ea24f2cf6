//! Pulling DSL programs out of model responses and sanity-checking them.

const FENCE: &str = "```";

/// Substrings that mark a line as program text
const CODE_MARKERS: &[&str] = &[
    "=", "square(", "circle(", "cube(", "cylinder(", "sphere(", "extrude(", "move(", "rotate(",
    "import", "from", "def ", "class ", "#",
];

/// Words typical of explanatory prose
const PROSE_WORDS: &[&str] = &[
    "create", "generate", "make", "build", "will", "should", "can", "must", "the", "this", "that",
    "these",
];

/// Extract program text from a completion.
///
/// Takes the first fenced block if there is one. Otherwise collects the run of
/// code-looking lines and stops at the first line of prose after it. If no line
/// looks like code the whole text comes back trimmed.
pub fn extract_code(text: &str) -> String {
    if text.trim().is_empty() {
        return String::new();
    }
    if let Some(block) = fenced_block(text) {
        return block.trim().to_string();
    }

    let mut lines = Vec::new();
    let mut in_code = false;
    for line in text.lines() {
        let stripped = line.trim();
        if stripped.is_empty() {
            if in_code {
                lines.push(line);
            }
            continue;
        }

        let looks_like_code = CODE_MARKERS.iter().any(|m| stripped.contains(m));
        let looks_like_prose = is_prose(stripped);

        if looks_like_code && !looks_like_prose {
            in_code = true;
            lines.push(line);
        } else if in_code && looks_like_prose {
            break;
        } else if in_code {
            lines.push(line);
        }
    }

    if lines.is_empty() {
        text.trim().to_string()
    } else {
        lines.join("\n").trim().to_string()
    }
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find(FENCE)? + FENCE.len();
    let rest = &text[start..];
    // optional language tag (`python`, `c++`, ...) on the opening fence line
    let line_len = rest.find('\n').unwrap_or(rest.len());
    let tag = rest[..line_len].trim_end_matches('\r');
    let body = if tag.contains(char::is_whitespace) || tag.contains('`') {
        rest
    } else {
        &rest[line_len..]
    };
    let end = body.find(FENCE)?;
    Some(&body[..end])
}

fn is_prose(line: &str) -> bool {
    let lower = line.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    words.len() > 5
        && words.iter().any(|w| PROSE_WORDS.contains(w))
        && !line.contains(['=', '(', ')', '[', ']', '{', '}'])
        && !line.starts_with('#')
}

/// Strip leftover fences, normalize newlines, collapse runs of blank lines.
pub fn clean_code(code: &str) -> String {
    let normalized = code.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    let mut blank_run = 0;
    for line in normalized.lines() {
        if line.trim_start().starts_with(FENCE) {
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Static checks run before handing code to the interpreter
pub fn validate_dsl_code(code: &str) -> Result<(), String> {
    if code.trim().is_empty() {
        return Err("Code is empty".into());
    }
    if !code.contains("from badcad import") && !code.contains("import badcad") {
        return Err("Missing BadCAD import statement".into());
    }
    if !code.contains("model =") {
        return Err("Missing 'model' variable assignment".into());
    }
    check_brackets(code)
}

/// Bracket balance, ignoring string literals and `#` comments
fn check_brackets(code: &str) -> Result<(), String> {
    let mut stack: Vec<(char, usize)> = Vec::new();
    for (idx, line) in code.lines().enumerate() {
        let line_no = idx + 1;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for c in line.chars() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '#' => break,
                '"' | '\'' => quote = Some(c),
                '(' | '[' | '{' => stack.push((c, line_no)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match stack.pop() {
                        Some((open, _)) if open == expected => {}
                        _ => return Err(format!("Syntax error: unmatched '{}' on line {}", c, line_no)),
                    }
                }
                _ => {}
            }
        }
    }
    match stack.pop() {
        Some((open, line_no)) => Err(format!("Syntax error: '{}' on line {} is never closed", open, line_no)),
        None => Ok(()),
    }
}
