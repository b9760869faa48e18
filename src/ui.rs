use crate::error::RicolError;
use dialoguer::console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::io::{self, IsTerminal};

#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    quiet: bool,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self { quiet: json }
    }

    #[cfg(test)]
    pub fn silent() -> Self {
        Self { quiet: true }
    }

    pub fn step(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("==>").bold().cyan(), style(message).bold());
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{message}");
        }
    }

    pub fn detail(&self, message: &str) {
        if !self.quiet {
            println!("{}", style(message).dim());
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ok").green().bold(), message);
        }
    }

    pub fn warn(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", style("warning:").yellow().bold(), message);
        }
    }
}

pub fn interactive() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

fn require_tty(what: &str, flag: &str) -> Result<(), RicolError> {
    if interactive() {
        return Ok(());
    }
    Err(RicolError::Validation(format!(
        "{what} is required; pass {flag} when running without a terminal"
    )))
}

pub fn select(prompt: &str, items: &[String], default: usize, flag: &str) -> Result<usize, RicolError> {
    require_tty(prompt, flag)?;
    let index = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(items)
        .default(default)
        .interact()?;
    Ok(index)
}

pub fn input<V>(prompt: &str, flag: &str, default: Option<&str>, validate: V) -> Result<String, RicolError>
where
    V: Fn(&String) -> Result<(), String>,
{
    require_tty(prompt, flag)?;
    let theme = ColorfulTheme::default();
    let mut builder = Input::<String>::with_theme(&theme).with_prompt(prompt);
    if let Some(value) = default {
        builder = builder.default(value.to_string());
    }
    let value = builder
        .validate_with(move |value: &String| validate(value))
        .interact_text()?;
    Ok(value)
}

pub fn confirm(prompt: &str, flag: &str, default: bool) -> Result<bool, RicolError> {
    require_tty(prompt, flag)?;
    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default)
        .interact()?;
    Ok(answer)
}
