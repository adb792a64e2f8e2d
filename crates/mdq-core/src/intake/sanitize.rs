//! Display-name sanitization.

/// Characters that are unsafe in file names on at least one common platform.
const RESERVED: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Sanitizes a user-supplied display name for use as an output file stem.
///
/// - Replaces each run of `\ / : * ? " < > |` with a single `-`
/// - Removes control characters
/// - Collapses whitespace runs to a single space
/// - Strips trailing dots and spaces, then surrounding whitespace
///
/// An empty result means the name carries nothing usable.
pub fn sanitize_display_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_space = false;
    let mut prev_reserved = false;

    for c in name.chars() {
        if RESERVED.contains(&c) {
            if !prev_reserved {
                out.push('-');
            }
            prev_reserved = true;
            prev_space = false;
            continue;
        }
        prev_reserved = false;
        if c.is_whitespace() {
            if !prev_space {
                out.push(' ');
            }
            prev_space = true;
            continue;
        }
        if c.is_control() {
            continue;
        }
        prev_space = false;
        out.push(c);
    }

    out.trim_end_matches(['.', ' ']).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_reserved_characters() {
        assert_eq!(sanitize_display_name("a/b\\c:d*e?f"), "a-b-c-d-e-f");
        assert_eq!(sanitize_display_name("\"x\" <y> |z|"), "-x- -y- -z-");
    }

    #[test]
    fn reserved_runs_become_one_dash() {
        assert_eq!(sanitize_display_name("a//b"), "a-b");
        assert_eq!(sanitize_display_name("What?!: the <sequel>"), "What-!- the -sequel-");
        assert_eq!(sanitize_display_name("x/ /y"), "x- -y");
    }

    #[test]
    fn strips_trailing_dots_and_spaces() {
        assert_eq!(sanitize_display_name("  My clip...  "), "My clip");
        assert_eq!(sanitize_display_name(".."), "");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(sanitize_display_name("Part\t1   of\n2"), "Part 1 of 2");
    }

    #[test]
    fn removes_control_chars() {
        assert_eq!(sanitize_display_name("file\x00na\x07me"), "filename");
    }

    #[test]
    fn keeps_unicode() {
        assert_eq!(sanitize_display_name("Übung – Teil 2"), "Übung – Teil 2");
    }
}
