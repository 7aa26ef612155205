//! `{placeholder}` substitution for dialog and objection text.

use std::collections::HashMap;

/// Replaces every `{key}` whose key is present in `context`. Unknown
/// placeholders and unbalanced braces are left as written.
pub fn render(template: &str, context: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match context.get(key.trim()) {
                    Some(value) if !key.contains('{') => out.push_str(value),
                    _ => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> HashMap<String, String> {
        HashMap::from([
            ("business_name".to_string(), "Harbor Bakery".to_string()),
            ("am_name".to_string(), "Sarah".to_string()),
        ])
    }

    #[test]
    fn test_substitutes_known_placeholders() {
        let out = render("Hi, this is {am_name}. Does that help {business_name}?", &ctx());
        assert_eq!(out, "Hi, this is Sarah. Does that help Harbor Bakery?");
    }

    #[test]
    fn test_leaves_unknown_and_unbalanced() {
        assert_eq!(render("Hello {customer_name}!", &ctx()), "Hello {customer_name}!");
        assert_eq!(render("Costs $5 {per month", &ctx()), "Costs $5 {per month");
        assert_eq!(render("", &ctx()), "");
    }
}
