// entities.rs — map entity string parsing and key lookups

use crate::q_shared::Vec3;
use crate::qfiles::{MAX_KEY, MAX_MAP_ENTITIES, MAX_VALUE};

const MAX_TOKEN_CHARS: usize = 1024;

/// Parse one token. Returns the token and the unparsed rest, or `None`
/// for the rest once the input is used up.
pub fn com_parse(data: &str) -> (String, Option<&str>) {
    let mut chars = data.as_bytes();
    let mut token = String::new();

    // skip whitespace
    loop {
        while !chars.is_empty() && chars[0] <= b' ' {
            chars = &chars[1..];
        }
        if chars.is_empty() {
            return (String::new(), None);
        }

        // skip // comments
        if chars.len() >= 2 && chars[0] == b'/' && chars[1] == b'/' {
            while !chars.is_empty() && chars[0] != b'\n' {
                chars = &chars[1..];
            }
            continue;
        }
        break;
    }

    let start = data.len() - chars.len();

    // handle quoted strings
    if chars[0] == b'"' {
        let body = &data[start + 1..];
        let (value, rest) = match body.find('"') {
            Some(end) => (&body[..end], Some(&body[end + 1..])),
            None => (body, None),
        };
        token.push_str(truncate(value, MAX_TOKEN_CHARS));
        return (token, rest);
    }

    // parse regular word
    let word_len = chars.iter().take_while(|&&c| c > b' ').count();
    let word = &data[start..start + word_len];
    if word.len() < MAX_TOKEN_CHARS {
        token.push_str(word);
    }
    let rest = &data[start + word_len..];
    (token, if rest.is_empty() { None } else { Some(rest) })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() < max {
        return s;
    }
    let mut end = max - 1;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================
// Entity
// ============================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    pub pairs: Vec<(String, String)>,
}

impl Entity {
    pub fn value_for_key(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Case-insensitive lookup, first match wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn float_for_key(&self, key: &str) -> f32 {
        leading_float(self.value_for_key(key))
    }

    pub fn int_for_key(&self, key: &str) -> i32 {
        leading_float(self.value_for_key(key)) as i32
    }

    /// Missing components come back as 0.
    pub fn vector_for_key(&self, key: &str) -> Vec3 {
        let mut out = [0.0; 3];
        for (slot, part) in out.iter_mut().zip(self.value_for_key(key).split_whitespace()) {
            *slot = leading_float(part);
        }
        out
    }

    /// First of several alternative keys that is present.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    pub fn classname(&self) -> &str {
        self.value_for_key("classname")
    }

    pub fn set_key(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(key)) {
            Some(pair) => pair.1 = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }
}

/// atof-style: parse the longest numeric prefix, 0 when there is none.
fn leading_float(s: &str) -> f32 {
    let s = s.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let c = bytes[end];
        let ok = c.is_ascii_digit()
            || ((c == b'-' || c == b'+')
                && (end == 0 || matches!(bytes[end - 1], b'e' | b'E')))
            || (c == b'.' && !seen_dot && !seen_exp)
            || ((c == b'e' || c == b'E') && !seen_exp && end > 0);
        if !ok {
            break;
        }
        seen_dot |= c == b'.';
        seen_exp |= c == b'e' || c == b'E';
        end += 1;
    }
    while end > 0 {
        if let Ok(v) = s[..end].parse::<f32>() {
            return v;
        }
        end -= 1;
    }
    0.0
}

// ============================================================
// Entity string
// ============================================================

/// Parse a whole entity lump ("{ "key" "value" ... }" blocks).
pub fn parse_entities(data: &str) -> Result<Vec<Entity>, String> {
    let mut entities = Vec::new();
    let mut remaining = Some(data);

    while let Some(text) = remaining {
        let (token, rest) = com_parse(text);
        if token.is_empty() && rest.is_none() {
            break;
        }
        if token != "{" {
            return Err(format!("found {} when expecting {{", token));
        }
        if entities.len() >= MAX_MAP_ENTITIES {
            return Err(format!("more than {} entities", MAX_MAP_ENTITIES));
        }

        let mut ent = Entity::default();
        let mut cursor = rest;
        loop {
            let Some(text) = cursor else {
                return Err("EOF without closing brace".to_string());
            };
            let (key, rest) = com_parse(text);
            if key == "}" {
                cursor = rest;
                break;
            }
            let Some(rest) = rest else {
                return Err("EOF without closing brace".to_string());
            };
            let (value, rest) = com_parse(rest);
            if value == "}" {
                return Err("closing brace without data".to_string());
            }
            if key.len() >= MAX_KEY || value.len() >= MAX_VALUE {
                return Err(format!("key/value pair too long: {}", key));
            }
            ent.pairs.push((key, value));
            cursor = rest;
        }
        entities.push(ent);
        remaining = cursor;
    }

    Ok(entities)
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ENTS: &str = r#"
// worldspawn first
{
"classname" "worldspawn"
"_ambient" "5"
}
{
"classname" "light"
"origin" "0 -32 128.5"
"light" "300"
"_color" "1 0.5 0.25"
}
"#;

    #[test]
    fn test_parse_entities() {
        let ents = parse_entities(ENTS).unwrap();
        assert_eq!(ents.len(), 2);
        assert_eq!(ents[0].classname(), "worldspawn");
        assert_eq!(ents[1].vector_for_key("origin"), [0.0, -32.0, 128.5]);
        assert_eq!(ents[1].float_for_key("LIGHT"), 300.0);
        assert_eq!(ents[1].int_for_key("missing"), 0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_entities("{ \"a\" \"b\"").is_err());
        assert!(parse_entities("\"a\" \"b\" }").is_err());
        assert!(parse_entities("{ \"a\" }").is_err());
        assert_eq!(parse_entities("  \n").unwrap().len(), 0);
    }

    #[test]
    fn test_leading_float() {
        assert_eq!(leading_float("12abc"), 12.0);
        assert_eq!(leading_float("-0.5"), -0.5);
        assert_eq!(leading_float("1e2"), 100.0);
        assert_eq!(leading_float("x"), 0.0);
    }

    #[test]
    fn test_set_key_and_first_of() {
        let mut e = Entity::default();
        e.set_key("_light", "200");
        e.set_key("_LIGHT", "250");
        assert_eq!(e.pairs.len(), 1);
        assert_eq!(e.first_of(&["light", "_light"]), Some("250"));
        assert!(!e.has_key("light"));
    }
}
