//! SQL LIKE patterns, translated to anchored regular expressions.
//!
//! The wildcard language is small: `%` matches any run of characters, `_`
//! matches exactly one, and `%[C]` escapes the single character `C`. Every
//! other character is emitted as a one-character class so regex
//! metacharacters in the pattern stay inert.
//!
//! Two renditions of this translation exist: this one, applied at parse
//! time when the LIKE operand is a string literal, and `like2r` in the
//! emitted AWK prelude for operands only known at run time.

fn encode_char(c: char, out: &mut String) {
    match c {
        '[' => out.push_str("\\["),
        ']' => out.push_str("\\]"),
        _ => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
    }
}

pub fn like_to_regex(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::from("^");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '%' => {
                // %[C] escape: exactly one character between the brackets
                if chars.get(i + 1) == Some(&'[') && chars.get(i + 3) == Some(&']') {
                    encode_char(chars[i + 2], &mut out);
                    i += 4;
                    continue;
                }
                out.push_str(".*");
            }
            '_' => out.push('.'),
            c => encode_char(c, &mut out),
        }
        i += 1;
    }

    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_any_run() {
        assert_eq!(like_to_regex("a%b"), "^[a].*[b]$");
    }

    #[test]
    fn underscore_is_any_char() {
        assert_eq!(like_to_regex("a_c"), "^[a].[c]$");
    }

    #[test]
    fn plain_chars_are_classed() {
        assert_eq!(like_to_regex("a.c"), "^[a][.][c]$");
    }

    #[test]
    fn escape_form_takes_the_bracketed_char() {
        assert_eq!(like_to_regex("%[%]"), "^[%]$");
        assert_eq!(like_to_regex("a%[_]b"), "^[a][_][b]$");
    }

    #[test]
    fn brackets_are_backslash_escaped() {
        assert_eq!(like_to_regex("[x]"), "^\\[[x]\\]$");
        assert_eq!(like_to_regex("%[[]"), "^\\[$");
    }

    #[test]
    fn empty_pattern() {
        assert_eq!(like_to_regex(""), "^$");
    }

    #[test]
    fn dangling_percent_is_wildcard() {
        assert_eq!(like_to_regex("abc%"), "^[a][b][c].*$");
        assert_eq!(like_to_regex("%["), "^.*\\[$");
    }
}
