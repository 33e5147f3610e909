//! The ordered substitution table.
//!
//! Rules run top to bottom, each as a full pass over the file. Later rules
//! assume the earlier ones already ran: `&amp;amp;` must collapse before the
//! `&amp;#` rule can see what it hides, and terminators can only be repaired
//! once the reference itself reads `&#`.

use std::borrow::Cow;
use std::io::{BufRead, Write};
use std::sync::LazyLock;

use regex::bytes::{NoExpand, Regex};

/// How a rule finds its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Exact byte sequence.
    Literal(&'static str),
    /// Regular expression; the replacement may use `${n}` group references.
    Pattern(&'static str),
}

/// One `(matcher, replacement)` pair of the entity repair.
#[derive(Debug, Clone, Copy)]
pub struct SubstitutionRule {
    /// Short label used in logs.
    pub name: &'static str,
    /// What to look for.
    pub matcher: Matcher,
    /// What to put in its place.
    pub replacement: &'static str,
}

/// The entity repair, in the order it must run.
pub const ENTITY_RULES: [SubstitutionRule; 5] = [
    SubstitutionRule {
        name: "triple-escaped numeric reference",
        matcher: Matcher::Literal("&amp;amp;#"),
        replacement: "&#",
    },
    SubstitutionRule {
        name: "double-escaped ampersand",
        matcher: Matcher::Literal("&amp;amp;"),
        replacement: "&amp;",
    },
    SubstitutionRule {
        name: "double-escaped numeric reference",
        matcher: Matcher::Literal("&amp;#"),
        replacement: "&#",
    },
    SubstitutionRule {
        name: "colon-terminated numeric reference",
        matcher: Matcher::Pattern(r"(&#[0-9]+):"),
        replacement: "${1};",
    },
    SubstitutionRule {
        name: "unterminated pound sign",
        matcher: Matcher::Literal("&#163<"),
        replacement: "&#163;<",
    },
];

/// A rule with its matcher compiled.
#[derive(Debug)]
pub struct CompiledRule {
    rule: SubstitutionRule,
    regex: Regex,
}

impl CompiledRule {
    fn new(rule: SubstitutionRule) -> Self {
        let source = match rule.matcher {
            Matcher::Literal(lit) => regex::escape(lit),
            Matcher::Pattern(pat) => pat.to_string(),
        };
        Self {
            rule,
            regex: Regex::new(&source).expect("valid substitution regex"),
        }
    }

    /// The rule this was compiled from.
    pub fn rule(&self) -> &SubstitutionRule {
        &self.rule
    }

    /// Rewrite one line, returning the new bytes and the number of matches.
    pub fn apply<'a>(&self, line: &'a [u8]) -> (Cow<'a, [u8]>, usize) {
        let hits = self.regex.find_iter(line).count();
        if hits == 0 {
            return (Cow::Borrowed(line), 0);
        }
        let replaced = match self.rule.matcher {
            Matcher::Literal(_) => self
                .regex
                .replace_all(line, NoExpand(self.rule.replacement.as_bytes())),
            Matcher::Pattern(_) => self
                .regex
                .replace_all(line, self.rule.replacement.as_bytes()),
        };
        (replaced, hits)
    }

    /// Run this rule as a full pass from `input` to `output`, line by line.
    ///
    /// Line endings and bytes outside a match are copied verbatim.
    pub fn apply_stream<R: BufRead, W: Write>(
        &self,
        mut input: R,
        output: &mut W,
    ) -> std::io::Result<usize> {
        let mut line = Vec::with_capacity(4096);
        let mut total = 0;
        loop {
            line.clear();
            if input.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            let (out, hits) = self.apply(&line);
            output.write_all(&out)?;
            total += hits;
        }
        Ok(total)
    }
}

static COMPILED: LazyLock<Vec<CompiledRule>> =
    LazyLock::new(|| ENTITY_RULES.iter().copied().map(CompiledRule::new).collect());

/// The compiled rules, in execution order.
pub fn compiled_rules() -> &'static [CompiledRule] {
    &COMPILED
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(index: usize, input: &str) -> String {
        let (out, _) = compiled_rules()[index].apply(input.as_bytes());
        String::from_utf8(out.into_owned()).unwrap()
    }

    #[test]
    fn rules_are_in_documented_order() {
        let names: Vec<_> = compiled_rules().iter().map(|r| r.rule().name).collect();
        assert_eq!(
            names,
            vec![
                "triple-escaped numeric reference",
                "double-escaped ampersand",
                "double-escaped numeric reference",
                "colon-terminated numeric reference",
                "unterminated pound sign",
            ]
        );
    }

    #[test]
    fn triple_escaped_reference_unescaped() {
        assert_eq!(run(0, "&amp;amp;#163;"), "&#163;");
    }

    #[test]
    fn double_escaped_ampersand_unescaped() {
        assert_eq!(run(1, "City &amp;amp; Guilds"), "City &amp; Guilds");
    }

    #[test]
    fn double_escaped_reference_unescaped() {
        assert_eq!(run(2, "&amp;#8217;s"), "&#8217;s");
    }

    #[test]
    fn colon_terminator_becomes_semicolon() {
        assert_eq!(run(3, "&#160:intermediate"), "&#160;intermediate");
        assert_eq!(run(3, "a &#8211: b &#38: c"), "a &#8211; b &#38; c");
    }

    #[test]
    fn colon_rule_ignores_hex_and_plain_colons() {
        assert_eq!(run(3, "&#xA0: time 10:30"), "&#xA0: time 10:30");
    }

    #[test]
    fn pound_sign_terminator_added() {
        assert_eq!(run(4, "<p>&#163</p>"), "<p>&#163;</p>");
    }

    #[test]
    fn literal_replacement_is_not_expanded() {
        // `$` in input must survive a literal rule untouched.
        assert_eq!(run(1, "$1 &amp;amp; $2"), "$1 &amp; $2");
    }

    #[test]
    fn apply_reports_hits() {
        let (_, hits) = compiled_rules()[1].apply(b"&amp;amp; and &amp;amp;");
        assert_eq!(hits, 2);
        let (out, hits) = compiled_rules()[1].apply(b"nothing here");
        assert_eq!(hits, 0);
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn apply_stream_preserves_line_endings() {
        let input = b"a &amp;amp; b\r\nno match\rstill\n&amp;amp;".to_vec();
        let mut out = Vec::new();
        let hits = compiled_rules()[1]
            .apply_stream(&input[..], &mut out)
            .unwrap();
        assert_eq!(hits, 2);
        assert_eq!(out, b"a &amp; b\r\nno match\rstill\n&amp;".to_vec());
    }
}
