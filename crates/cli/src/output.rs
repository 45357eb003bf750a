//! Terminal rendering of command results.

#![allow(clippy::print_stdout)]

use serde::Serialize;

use bugdesk_core::{Bug, BugListItem, Developer, PaginatedResult, User};

use crate::commands::CliError;

/// Print a value as pretty JSON.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn user(user: &User) {
    println!("{} <{}>", user.full_name, user.email);
    println!("  id:   {}", user.id);
    println!("  role: {}", user.role);
}

pub fn developers(developers: &[Developer]) {
    if developers.is_empty() {
        println!("No developers.");
        return;
    }
    for dev in developers {
        println!("{:<38} {} <{}>", dev.id, dev.full_name, dev.email);
    }
}

pub fn bug_page(page: &PaginatedResult<BugListItem>) {
    if page.items.is_empty() {
        println!("No bugs found.");
        return;
    }
    println!(
        "{:>6}  {:<8} {:<12} {:<40} {}",
        "ID", "SEVERITY", "STATUS", "TITLE", "ASSIGNEE"
    );
    for item in &page.items {
        println!(
            "{:>6}  {:<8} {:<12} {:<40} {}",
            item.id,
            item.severity.label(),
            item.status.label(),
            truncate(&item.title, 40),
            item.assigned_developer_name.as_deref().unwrap_or("-"),
        );
    }
    println!(
        "\nPage {} of {} ({} bugs)",
        page.page_number,
        page.total_pages.max(1),
        page.total_count
    );
}

pub fn bug(bug: &Bug) {
    println!("#{} {}", bug.id, bug.title);
    println!("  severity: {}", bug.severity.label());
    println!("  status:   {}", bug.status.label());
    println!("  reporter: {} <{}>", bug.reporter_name, bug.reporter_email);
    match (&bug.assigned_developer_name, &bug.assigned_developer_email) {
        (Some(name), Some(email)) => println!("  assignee: {name} <{email}>"),
        (Some(name), None) => println!("  assignee: {name}"),
        _ => println!("  assignee: -"),
    }
    println!("  created:  {}", bug.created_at);
    if let Some(updated) = &bug.updated_at {
        println!("  updated:  {updated}");
    }
    println!("\n{}", bug.description);
    if let Some(steps) = &bug.reproduction_steps {
        println!("\nSteps to reproduce:\n{steps}");
    }
    if !bug.attachments.is_empty() {
        println!("\nAttachments:");
        for attachment in bug.attachments.iter() {
            println!(
                "  [{}] {} ({}, {} bytes)",
                attachment.id, attachment.file_name, attachment.content_type, attachment.file_size
            );
        }
    }
}

pub fn line(message: impl std::fmt::Display) {
    println!("{message}");
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
