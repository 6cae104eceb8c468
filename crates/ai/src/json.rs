use serde_json::{Map, Value};

/// Find the first well-formed JSON object embedded anywhere in `text`.
///
/// Models often wrap their answer in prose or code fences, so every `{` is
/// tried as a start position until a balanced span parses as an object.
pub fn first_json_object(text: &str) -> Option<Map<String, Value>> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .find_map(|(start, _)| {
            let end = balanced_end(&text[start..])?;
            match serde_json::from_str::<Value>(&text[start..start + end]) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            }
        })
}

/// Byte length of the balanced `{...}` span at the start of `s`, honouring
/// braces inside string literals.
fn balanced_end(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object() {
        let obj = first_json_object(r#"{"a": 1}"#).unwrap();
        assert_eq!(obj["a"], 1);
    }

    #[test]
    fn object_surrounded_by_prose_and_fences() {
        let text = "Sure! Here is the result:\n```json\n{\"transaction_type\": \"income\", \"confidence\": 0.8}\n```\nLet me know.";
        let obj = first_json_object(text).unwrap();
        assert_eq!(obj["transaction_type"], "income");
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let text = r#"{"reasoning": "vendor {ACME} matched \"}\"", "confidence": 0.9}"#;
        let obj = first_json_object(text).unwrap();
        assert_eq!(obj["confidence"], 0.9);
    }

    #[test]
    fn skips_malformed_candidate_and_finds_next() {
        let text = r#"{not json} then {"ok": true}"#;
        let obj = first_json_object(text).unwrap();
        assert_eq!(obj["ok"], true);
    }

    #[test]
    fn nested_object_returns_outer() {
        let obj = first_json_object(r#"x {"outer": {"inner": 1}} y"#).unwrap();
        assert!(obj.contains_key("outer"));
    }

    #[test]
    fn none_when_absent_or_unbalanced() {
        assert!(first_json_object("no json here").is_none());
        assert!(first_json_object(r#"{"open": 1"#).is_none());
        assert!(first_json_object("").is_none());
    }
}
