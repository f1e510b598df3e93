//! Name conversions
//!
//! Property and method names are camelCase in code and kebab-case in
//! attribute names (`isOpen` ↔ `data-menu.is-open`).

/// Convert kebab-case to camelCase
pub fn to_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut capitalize_next = false;

    for c in s.chars() {
        if c == '-' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }

    result
}

/// Convert camelCase or PascalCase to kebab-case
pub fn to_kebab_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);

    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if !result.is_empty() {
                result.push('-');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Token for a class-style name: `DropdownMenuController` → `dropdown-menu`
pub fn class_name_to_token(name: &str) -> String {
    let trimmed = match name.strip_suffix("Controller") {
        Some(rest) if !rest.is_empty() => rest,
        _ => name,
    };
    to_kebab_case(trimmed)
}

/// Tokens are lowercase kebab-case words: `[a-z][a-z0-9-]*`
pub fn is_valid_token(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !token.ends_with('-')
}
