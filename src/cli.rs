//! interactive prompt helpers and input validation

use std::{
    error::Error,
    io::{self, Write},
};

use crate::FIELD_DESCRIPTORS;

// ── Secret redaction ──
pub fn redact_if_secret(env_var: &str, value: &str) -> String {
    let is_secret = FIELD_DESCRIPTORS
        .iter()
        .find(|fd| fd.ev == env_var)
        .map(|fd| fd.s)
        .unwrap_or(false);

    if is_secret {
        redact(value)
    } else {
        value.to_string()
    }
}

fn redact(value: &str) -> String {
    // Slice on char boundaries — secrets are operator-supplied and not
    // guaranteed to be ASCII.
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        "****".to_string()
    } else {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

// ── Interactive helpers ──
pub fn prompt_continue(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    question: &str,
) -> Result<bool, io::Error> {
    print!("  {} [Y/n]: ", question);
    io::stdout().flush()?;
    let answer = lines.next().unwrap_or(Ok(String::new()))?;
    let answer = answer.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

pub fn read_input(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    prompt: &str,
    default: Option<&str>,
) -> Result<String, io::Error> {
    if let Some(def) = default {
        // Show default as a dim placeholder on the input line
        tracing::info!("  {}", prompt);
        print!("  \x1b[2m{}\x1b[0m > ", def);
    } else {
        print!("  {}: ", prompt);
    }
    io::stdout().flush()?;
    let input = lines.next().unwrap_or(Ok(String::new()))?;
    let input = input.trim().to_string();
    if input.is_empty() {
        if let Some(def) = default {
            return Ok(def.to_string());
        }
    }
    Ok(input)
}

/// Like `read_input` but hides the typed value (for secrets).
pub fn read_secret_input(prompt: &str, default: Option<&str>) -> Result<String, Box<dyn Error>> {
    let display = if let Some(def) = default {
        // Show prompt, then redacted placeholder hint (rpassword hides typed input)
        tracing::info!("  {}", prompt);
        format!("  \x1b[2m{}\x1b[0m > ", redact(def))
    } else {
        format!("  {}: ", prompt)
    };
    let input = rpassword::prompt_password(&display)?;
    let input = input.trim().to_string();
    if input.is_empty() {
        if let Some(def) = default {
            return Ok(def.to_string());
        }
    }
    Ok(input)
}

/// Re-prompt until `validate` accepts the input.
pub fn read_validated(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    prompt: &str,
    default: Option<&str>,
    validate: impl Fn(&str) -> Result<(), String>,
) -> Result<String, Box<dyn Error>> {
    loop {
        let input = read_input(lines, prompt, default)?;
        match validate(&input) {
            Ok(()) => return Ok(input),
            Err(reason) => tracing::warn!("  Invalid input: {} — try again.", reason),
        }
    }
}

/// Numbered selection constrained to the given options. Empty input takes
/// the first option.
pub fn read_choice(
    lines: &mut io::Lines<io::StdinLock<'_>>,
    prompt: &str,
    options: &[&str],
) -> Result<usize, Box<dyn Error>> {
    loop {
        tracing::info!("  {}", prompt);
        for (i, opt) in options.iter().enumerate() {
            tracing::info!("    {}) {}", i + 1, opt);
        }
        print!("  Select (1-{}): ", options.len());
        io::stdout().flush()?;
        let input = lines.next().unwrap_or(Ok(String::new()))?;
        let input = input.trim().to_string();
        if input.is_empty() {
            return Ok(0);
        }
        match input.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => tracing::warn!(
                "  Invalid selection '{}' — enter a number between 1 and {}.",
                input,
                options.len()
            ),
        }
    }
}

// ── Validators ──

pub fn validate_domain(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("domain must not be empty".into());
    }
    if !s.contains('.') {
        return Err(format!("'{}' is not a fully qualified domain name", s));
    }
    for label in s.split('.') {
        if label.is_empty() {
            return Err(format!("'{}' contains an empty label", s));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("label '{}' starts or ends with a hyphen", label));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(format!("label '{}' has characters outside [a-z0-9-]", label));
        }
    }
    Ok(())
}

pub fn validate_email(s: &str) -> Result<(), String> {
    let Some((local, domain)) = s.split_once('@') else {
        return Err(format!("'{}' is missing '@'", s));
    };
    if local.is_empty() {
        return Err(format!("'{}' has an empty local part", s));
    }
    if s.matches('@').count() != 1 {
        return Err(format!("'{}' has more than one '@'", s));
    }
    validate_domain(domain)
}

pub fn validate_port(s: &str) -> Result<(), String> {
    match s.parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(()),
        Ok(p) => Err(format!("port {} outside [1, 65535]", p)),
        Err(_) => Err(format!("'{}' is not a port number", s)),
    }
}

pub fn validate_non_empty(s: &str) -> Result<(), String> {
    if s.trim().is_empty() {
        Err("value must not be empty".into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_validation() {
        assert!(validate_domain("vault.example.com").is_ok());
        assert!(validate_domain("example.com").is_ok());
        assert!(validate_domain("localhost").is_err());
        assert!(validate_domain("").is_err());
        assert!(validate_domain("vault..example.com").is_err());
        assert!(validate_domain("-bad.example.com").is_err());
        assert!(validate_domain("va ult.example.com").is_err());
    }

    #[test]
    fn email_validation() {
        assert!(validate_email("admin@example.com").is_ok());
        assert!(validate_email("adminexample.com").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("a@b@example.com").is_err());
        assert!(validate_email("admin@localhost").is_err());
    }

    #[test]
    fn port_validation() {
        assert!(validate_port("1").is_ok());
        assert!(validate_port("443").is_ok());
        assert!(validate_port("65535").is_ok());
        assert!(validate_port("0").is_err());
        assert!(validate_port("65536").is_err());
        assert!(validate_port("https").is_err());
    }

    #[test]
    fn secret_redaction() {
        assert_eq!(redact_if_secret("VAULTSHIP_ADMIN_TOKEN", "abcdefgh"), "ab...gh");
        assert_eq!(redact_if_secret("VAULTSHIP_ADMIN_TOKEN", "ab"), "****");
        assert_eq!(
            redact_if_secret("VAULTSHIP_DOMAIN", "vault.example.com"),
            "vault.example.com"
        );
        // Non-ASCII secrets must not split a multibyte character
        assert_eq!(redact_if_secret("VAULTSHIP_ADMIN_TOKEN", "pässwörtchen"), "pä...en");
        assert_eq!(redact_if_secret("VAULTSHIP_ADMIN_TOKEN", "käse"), "****");
    }
}
