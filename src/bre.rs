//! POSIX BRE/ERE to `regex`-crate syntax translation.
//!
//! The editor's address and substitution patterns use POSIX basic regular
//! expressions (extended with `-E`), including the GNU `\+ \? \| \< \>`
//! additions. The matcher underneath is the `regex` crate, whose syntax is
//! close to ERE; this module inverts the BRE escaping rules and patches the
//! remaining differences so patterns can be handed to it directly.
//!
//! Back-references inside patterns (`\(x\)\1`) are the one POSIX feature the
//! matcher cannot express; they are rejected with a clear message.

use crate::error::{EdError, Result};

/// Translate a POSIX pattern to the matcher's syntax.
pub fn translate(pattern: &str, extended: bool) -> Result<String> {
    if extended {
        translate_ere(pattern)
    } else {
        translate_bre(pattern)
    }
}

fn regex_err(msg: &str) -> EdError {
    EdError::Regex(msg.to_string())
}

/// Copy a bracket expression, `[` already consumed. POSIX named classes
/// `[: :]`, `[. .]`, `[= =]` nest without terminating the outer class.
/// Characters that are ordinary in a POSIX bracket expression but special
/// to the matcher's class syntax (`]` first, inner `[`, `\`, the `&`/`~`
/// set operators) are escaped.
fn copy_char_class(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, out: &mut String) -> Result<()> {
    out.push('[');
    if chars.peek() == Some(&'^') {
        out.push('^');
        chars.next();
    }
    if chars.peek() == Some(&']') {
        out.push_str("\\]");
        chars.next();
    }
    while let Some(c) = chars.next() {
        match c {
            ']' => {
                out.push(']');
                return Ok(());
            }
            '\\' => out.push_str("\\\\"),
            '&' | '~' => {
                out.push('\\');
                out.push(c);
            }
            '[' => match chars.peek() {
                Some(&d) if d == ':' || d == '.' || d == '=' => {
                    out.push('[');
                    out.push(d);
                    chars.next();
                    let mut prev = ' ';
                    for inner in chars.by_ref() {
                        out.push(inner);
                        if prev == d && inner == ']' {
                            break;
                        }
                        prev = inner;
                    }
                }
                _ => out.push_str("\\["),
            },
            _ => out.push(c),
        }
    }
    Err(EdError::UnbalancedBrackets)
}

/// In BRE the group and alternation operators are the escaped forms; the
/// bare characters are literals. `*` is literal at the start of an
/// expression or subexpression, and `^`/`$` anchor only at the edges.
fn translate_bre(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();
    // true while no quantifiable atom precedes the cursor
    let mut at_atom_start = true;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(e) = chars.next() else {
                    return Err(EdError::TrailingBackslash);
                };
                match e {
                    '(' => {
                        out.push('(');
                        at_atom_start = true;
                        continue;
                    }
                    ')' => out.push(')'),
                    '{' => {
                        out.push('{');
                        if chars.peek() == Some(&',') {
                            out.push('0'); // the matcher wants an explicit lower bound
                        }
                    }
                    '}' => out.push('}'),
                    '+' | '?' => out.push(e),
                    '|' => {
                        out.push('|');
                        at_atom_start = true;
                        continue;
                    }
                    '<' | '>' => out.push_str("\\b"),
                    '1'..='9' => {
                        return Err(regex_err("backreferences in patterns are not supported"));
                    }
                    '\\' => out.push_str("\\\\"),
                    '.' | '*' | '[' | ']' | '^' | '$' => {
                        out.push('\\');
                        out.push(e);
                    }
                    'w' | 'W' | 's' | 'S' | 'b' | 'B' | 'd' | 'D' | 'n' | 't' | 'r' | 'a' | 'f'
                    | 'v' => {
                        out.push('\\');
                        out.push(e);
                    }
                    _ => {
                        // undefined escape: the escaped character stands for
                        // itself
                        if e.is_ascii_alphanumeric() {
                            out.push(e);
                        } else {
                            out.push('\\');
                            out.push(e);
                        }
                    }
                }
                at_atom_start = false;
            }
            '(' | ')' | '{' | '}' | '+' | '?' | '|' => {
                // bare operators are ordinary characters in BRE
                out.push('\\');
                out.push(c);
                at_atom_start = false;
            }
            '*' => {
                if at_atom_start {
                    out.push_str("\\*");
                } else {
                    out.push('*');
                }
                at_atom_start = false;
            }
            '^' => {
                if at_atom_start {
                    out.push('^');
                    // still at the start: "^*" is a literal asterisk
                } else {
                    out.push_str("\\^");
                    at_atom_start = false;
                }
            }
            '$' => {
                let anchors = match chars.peek() {
                    None => true,
                    Some('\\') => {
                        let rest = chars.clone().collect::<String>();
                        rest.starts_with("\\)") || rest.starts_with("\\|")
                    }
                    Some(_) => false,
                };
                if anchors {
                    out.push('$');
                } else {
                    out.push_str("\\$");
                }
                at_atom_start = false;
            }
            '[' => {
                copy_char_class(&mut chars, &mut out)?;
                at_atom_start = false;
            }
            _ => {
                out.push(c);
                at_atom_start = false;
            }
        }
    }
    Ok(out)
}

/// ERE is nearly the matcher's own syntax; only the GNU word boundaries and
/// the unsupported back-references need attention.
fn translate_ere(pattern: &str) -> Result<String> {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(e) = chars.next() else {
                    return Err(EdError::TrailingBackslash);
                };
                match e {
                    '<' | '>' => out.push_str("\\b"),
                    '1'..='9' => {
                        return Err(regex_err("backreferences in patterns are not supported"));
                    }
                    _ if e.is_ascii_alphanumeric()
                        && !matches!(
                            e,
                            'w' | 'W' | 's' | 'S' | 'b' | 'B' | 'd' | 'D' | 'n' | 't' | 'r'
                                | 'a' | 'f' | 'v'
                        ) =>
                    {
                        out.push(e);
                    }
                    _ => {
                        out.push('\\');
                        out.push(e);
                    }
                }
            }
            '{' => {
                out.push('{');
                if chars.peek() == Some(&',') {
                    out.push('0');
                }
            }
            '[' => copy_char_class(&mut chars, &mut out)?,
            _ => out.push(c),
        }
    }
    Ok(out)
}
