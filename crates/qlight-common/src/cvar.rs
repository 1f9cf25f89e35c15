// cvar.rs — named compile variables

use crate::common::{com_dprintf, com_printf};

use std::collections::HashMap;

pub const CVAR_ARCHIVE: i32 = 1;
/// Cannot be changed once registered, except by `force_set`.
pub const CVAR_NOSET: i32 = 8;

/// A compile variable: its text and the number parsed from it.
#[derive(Clone, Debug)]
pub struct Cvar {
    pub name: String,
    pub string: String,
    pub flags: i32,
    pub value: f32,
}

/// Variables in registration order with a name index.
#[derive(Default)]
pub struct CvarContext {
    vars: Vec<Cvar>,
    by_name: HashMap<String, usize>,
}

impl CvarContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_var(&self, name: &str) -> Option<&Cvar> {
        self.by_name.get(name).map(|&idx| &self.vars[idx])
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Get the floating-point value of a cvar. Returns 0 if not found.
    pub fn variable_value(&self, name: &str) -> f32 {
        match self.find_var(name) {
            Some(var) => var.value,
            None => 0.0,
        }
    }

    /// Get the string value of a cvar. Returns "" if not found.
    pub fn variable_string(&self, name: &str) -> &str {
        match self.find_var(name) {
            Some(var) => &var.string,
            None => "",
        }
    }

    /// Value of `name` if it exists, otherwise `default`.
    pub fn value_or(&self, name: &str, default: f32) -> f32 {
        self.find_var(name).map(|v| v.value).unwrap_or(default)
    }

    /// Parse a "x y z" cvar into a vector.
    pub fn vector_or(&self, name: &str, default: [f32; 3]) -> [f32; 3] {
        let Some(var) = self.find_var(name) else {
            return default;
        };
        let mut out = default;
        let mut parts = var.string.split_whitespace();
        for slot in out.iter_mut() {
            match parts.next().map(str::parse::<f32>) {
                Some(Ok(v)) => *slot = v,
                _ => {
                    com_dprintf(&format!("{}: expected three numbers in \"{}\"\n", name, var.string));
                    return default;
                }
            }
        }
        out
    }

    /// Get or create a cvar. If it already exists, the value is not changed
    /// but flags are OR'd in.
    pub fn get(&mut self, name: &str, value: Option<&str>, flags: i32) -> Option<usize> {
        if let Some(&idx) = self.by_name.get(name) {
            self.vars[idx].flags |= flags;
            return Some(idx);
        }
        let value = value?;
        let idx = self.vars.len();
        self.vars.push(Cvar {
            name: name.to_string(),
            string: value.to_string(),
            flags,
            value: parse_value(value),
        });
        self.by_name.insert(name.to_string(), idx);
        Some(idx)
    }

    fn store(&mut self, name: &str, value: &str, force: bool) -> Option<usize> {
        let Some(&idx) = self.by_name.get(name) else {
            return self.get(name, Some(value), 0);
        };
        let var = &mut self.vars[idx];
        if !force && var.flags & CVAR_NOSET != 0 {
            com_printf(&format!("{} is write protected.\n", name));
            return Some(idx);
        }
        var.string = value.to_string();
        var.value = parse_value(value);
        Some(idx)
    }

    /// Set a variable unless it is write protected.
    pub fn set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.store(name, value, false)
    }

    pub fn force_set(&mut self, name: &str, value: &str) -> Option<usize> {
        self.store(name, value, true)
    }

    /// Apply `name value` lines, skipping blanks and `//` comments. Returns
    /// how many were applied.
    pub fn apply_lines(&mut self, text: &str) -> usize {
        let mut applied = 0;
        for line in text.lines() {
            let line = line.split("//").next().unwrap_or("").trim();
            let Some((name, value)) = line.split_once(char::is_whitespace) else {
                if !line.is_empty() {
                    com_dprintf(&format!("{}: missing value\n", line));
                }
                continue;
            };
            let value = value.trim().trim_matches('"');
            if self.set(name, value).is_some() {
                applied += 1;
            }
        }
        applied
    }
}

/// Text that is not a number reads as 0.
fn parse_value(text: &str) -> f32 {
    text.trim().parse::<f32>().unwrap_or(0.0)
}
