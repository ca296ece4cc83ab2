use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use stackswap_core::{FirmwareInfo, InstallationResult, ResultCode};
use stackswap_installer::ResumeOutcome;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn current_output_style() -> OutputStyle {
    let no_color = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
    if !no_color && std::io::stdout().is_terminal() {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!();
            println!("{}", colorize(section_style(), &format!("== {title} ==")));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

fn result_status(code: ResultCode) -> &'static str {
    match code {
        ResultCode::Ok => "ok",
        ResultCode::NeedCompletion => "step",
        ResultCode::InstallFailed => "err",
    }
}

pub(crate) fn format_install_result_lines(
    target_name: &str,
    result: &InstallationResult,
    style: OutputStyle,
) -> Vec<String> {
    let mut lines = vec![render_status_line(
        style,
        result_status(result.code),
        &format!("install {target_name}: {}", result.code.as_str()),
    )];
    if !result.description.is_empty() {
        lines.push(format!("reason: {}", result.description));
    }
    if result.code == ResultCode::NeedCompletion {
        lines.push("completion: pending until the outer image update is applied".to_string());
    }
    lines
}

pub(crate) fn format_resume_outcome_line(outcome: &ResumeOutcome, style: OutputStyle) -> String {
    match outcome {
        ResumeOutcome::Clean => render_status_line(style, "ok", "no pending update"),
        ResumeOutcome::DiscardedUncommitted => render_status_line(
            style,
            "warn",
            "discarded staged manifest without a pending update record",
        ),
        ResumeOutcome::Completed => render_status_line(style, "ok", "completed pending update"),
        ResumeOutcome::RolledBack { reason } => {
            render_status_line(style, "err", &format!("rolled back pending update: {reason}"))
        }
    }
}

pub(crate) fn format_status_lines(info: &FirmwareInfo, pending_update: bool) -> Vec<String> {
    vec![
        format!("name: {}", info.name),
        format!("sha256: {}", info.sha256),
        format!("length: {}", info.len),
        format!(
            "pending_update: {}",
            if pending_update { "yes" } else { "no" }
        ),
    ]
}
