//! Bug listing, detail and write commands.

use bugdesk_client::api::BugSearch;
use bugdesk_client::cache::CacheValue;
use bugdesk_client::mutations::{Mutation, MutationOutput};
use bugdesk_client::permissions::BugPermissions;
use bugdesk_client::queries::Query;
use bugdesk_client::views::View;
use bugdesk_core::{
    Bug, BugId, BugListItem, BugStatus, CreateBugDto, PageParams, PaginatedResult, Severity,
    UpdateBugDto, UserId,
};

use super::{CliError, Context, positive_id};
use crate::output;

/// Which listing to show.
#[derive(Debug, Clone)]
pub enum Listing {
    Mine,
    Assigned,
    Unassigned { search: Option<String> },
}

/// Fields to change on a bug; unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct Edit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub steps: Option<String>,
}

impl Edit {
    const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.severity.is_none()
            && self.steps.is_none()
    }

    /// Merge the changes over the current bug.
    fn apply(self, bug: &Bug) -> UpdateBugDto {
        UpdateBugDto {
            title: self.title.unwrap_or_else(|| bug.title.clone()),
            description: self.description.unwrap_or_else(|| bug.description.clone()),
            severity: self.severity.unwrap_or(bug.severity),
            reproduction_steps: self
                .steps
                .or_else(|| bug.reproduction_steps.clone())
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

// =============================================================================
// Reads
// =============================================================================

async fn read(ctx: &Context, query: Query) -> Result<CacheValue, CliError> {
    match ctx.app.queries().fetch(query).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_auth() => Err(CliError::NotSignedIn),
        Err(e) => Err(e.into()),
    }
}

async fn read_page(
    ctx: &Context,
    query: Query,
) -> Result<PaginatedResult<BugListItem>, CliError> {
    read(ctx, query)
        .await?
        .as_bug_page()
        .cloned()
        .ok_or(CliError::Unexpected("bug listing"))
}

async fn read_bug(ctx: &Context, id: BugId) -> Result<Bug, CliError> {
    read(ctx, ctx.app.queries().bug_by_id(id))
        .await?
        .as_bug()
        .cloned()
        .ok_or(CliError::Unexpected("bug detail"))
}

fn page(ctx: &Context, number: u32) -> Result<PageParams, CliError> {
    PageParams::new(number, ctx.app.config().page_size)
        .map_err(|e| CliError::InvalidArgument(e.to_string()))
}

fn show_page(ctx: &Context, page: &PaginatedResult<BugListItem>) -> Result<(), CliError> {
    if ctx.json {
        return output::json(page);
    }
    output::bug_page(page);
    Ok(())
}

fn show_bug(ctx: &Context, bug: &Bug) -> Result<(), CliError> {
    if ctx.json {
        return output::json(bug);
    }
    output::bug(bug);
    Ok(())
}

/// List one of the bug listings.
pub async fn list(ctx: &Context, listing: Listing, number: u32) -> Result<(), CliError> {
    let page = page(ctx, number)?;
    let queries = ctx.app.queries();
    let query = match listing {
        Listing::Mine => {
            ctx.require(View::MyBugs)?;
            queries.my_bugs(page)
        }
        Listing::Assigned => {
            ctx.require(View::AssignedBugs)?;
            queries.assigned_bugs(page)
        }
        Listing::Unassigned { search } => {
            ctx.require(View::UnassignedBugs)?;
            queries.unassigned_bugs(search, page)
        }
    };
    let result = read_page(ctx, query).await?;
    show_page(ctx, &result)
}

/// Search all bugs.
pub async fn search(
    ctx: &Context,
    term: Option<String>,
    severity: Option<Severity>,
    status: Option<BugStatus>,
    number: u32,
) -> Result<(), CliError> {
    ctx.require(View::Dashboard)?;
    let search = BugSearch {
        term,
        severity,
        status,
    };
    let query = ctx.app.queries().search_bugs(search, page(ctx, number)?);
    let result = read_page(ctx, query).await?;
    show_page(ctx, &result)
}

/// Show one bug.
pub async fn show(ctx: &Context, id: i64) -> Result<(), CliError> {
    let id = BugId::new(positive_id(id, "bug")?);
    ctx.require(View::BugDetail(id))?;
    let bug = read_bug(ctx, id).await?;
    show_bug(ctx, &bug)
}

/// List developers.
pub async fn developers(ctx: &Context) -> Result<(), CliError> {
    ctx.require(View::Dashboard)?;
    let value = read(ctx, ctx.app.queries().developers()).await?;
    let developers = value
        .as_developers()
        .ok_or(CliError::Unexpected("developers"))?;
    if ctx.json {
        return output::json(developers);
    }
    output::developers(developers);
    Ok(())
}

// =============================================================================
// Writes
// =============================================================================

fn written_bug(output: MutationOutput) -> Result<Bug, CliError> {
    match output {
        MutationOutput::Bug(bug) => Ok(*bug),
        _ => Err(CliError::Unexpected("bug write")),
    }
}

/// Report a bug.
pub async fn create(
    ctx: &Context,
    title: String,
    description: String,
    severity: Severity,
    steps: Option<String>,
) -> Result<(), CliError> {
    ctx.require(View::CreateBug)?;
    if title.trim().is_empty() || description.trim().is_empty() {
        return Err(CliError::InvalidArgument(
            "title and description are required".to_string(),
        ));
    }
    let payload = CreateBugDto {
        title,
        description,
        severity,
        reproduction_steps: steps.filter(|s| !s.trim().is_empty()),
    };
    let bug = written_bug(ctx.mutate(Mutation::CreateBug(payload)).await?)?;
    tracing::info!(bug_id = %bug.id, "Bug reported");
    show_bug(ctx, &bug)
}

/// Edit a bug's fields.
pub async fn update(ctx: &Context, id: i64, edit: Edit) -> Result<(), CliError> {
    let id = BugId::new(positive_id(id, "bug")?);
    ctx.require(View::EditBug(id))?;
    if edit.is_empty() {
        return Err(CliError::InvalidArgument("nothing to change".to_string()));
    }

    let current = read_bug(ctx, id).await?;
    let permissions = BugPermissions::for_user(ctx.app.session().current_user().as_ref(), &current);
    if !permissions.can_edit() {
        return Err(CliError::Forbidden(View::EditBug(id).path()));
    }

    let payload = edit.apply(&current);
    let bug = written_bug(ctx.mutate(Mutation::UpdateBug { id, payload }).await?)?;
    show_bug(ctx, &bug)
}

/// Move a bug to a new status.
pub async fn set_status(ctx: &Context, id: i64, status: BugStatus) -> Result<(), CliError> {
    let id = BugId::new(positive_id(id, "bug")?);
    ctx.require(View::BugDetail(id))?;

    let current = read_bug(ctx, id).await?;
    let permissions = BugPermissions::for_user(ctx.app.session().current_user().as_ref(), &current);
    if !permissions.can_update_status() {
        return Err(CliError::InvalidArgument(
            "only the assigned developer can change the status".to_string(),
        ));
    }

    let bug = written_bug(ctx.mutate(Mutation::UpdateBugStatus { id, status }).await?)?;
    output::line(format!("Bug #{} is now {}", bug.id, bug.status.label()));
    Ok(())
}

/// Assign a bug to a developer, or to the caller.
pub async fn assign(ctx: &Context, id: i64, developer: Option<String>) -> Result<(), CliError> {
    let id = BugId::new(positive_id(id, "bug")?);
    ctx.require(View::BugDetail(id))?;

    let current = read_bug(ctx, id).await?;
    let permissions = BugPermissions::for_user(ctx.app.session().current_user().as_ref(), &current);
    let allowed = match &developer {
        Some(_) => permissions.can_assign(),
        None => permissions.can_self_assign(&current),
    };
    if !allowed {
        return Err(CliError::InvalidArgument(
            "you cannot assign this bug".to_string(),
        ));
    }

    let mutation = Mutation::AssignBug {
        id,
        developer_id: developer.map(UserId::new),
    };
    let bug = written_bug(ctx.mutate(mutation).await?)?;
    output::line(format!(
        "Bug #{} assigned to {}",
        bug.id,
        bug.assigned_developer_name.as_deref().unwrap_or("you")
    ));
    Ok(())
}

/// Remove a bug's assignee.
pub async fn unassign(ctx: &Context, id: i64) -> Result<(), CliError> {
    let id = BugId::new(positive_id(id, "bug")?);
    ctx.require(View::BugDetail(id))?;
    let bug = written_bug(ctx.mutate(Mutation::UnassignBug(id)).await?)?;
    output::line(format!("Bug #{} is unassigned", bug.id));
    Ok(())
}

/// Delete a bug.
pub async fn delete(ctx: &Context, id: i64) -> Result<(), CliError> {
    let id = BugId::new(positive_id(id, "bug")?);
    ctx.require(View::BugDetail(id))?;
    let outcome = ctx.mutate(Mutation::DeleteBug(id)).await?;
    output::line(format!("Bug #{id} deleted"));
    if let Some(view) = outcome.navigate_to() {
        tracing::debug!(%view, "Leaving deleted bug");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bug() -> Bug {
        Bug {
            id: BugId::new(42),
            title: "Crash on save".to_string(),
            description: "The editor exits".to_string(),
            severity: Severity::High,
            status: BugStatus::Open,
            reproduction_steps: Some("Press save".to_string()),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            updated_at: None,
            reporter_id: UserId::new("u1"),
            reporter_name: "Ann".to_string(),
            reporter_email: "ann@example.com".to_string(),
            assigned_developer_id: None,
            assigned_developer_name: None,
            assigned_developer_email: None,
            attachments: std::sync::Arc::from([]),
        }
    }

    #[test]
    fn test_edit_keeps_unset_fields() {
        let edit = Edit {
            severity: Some(Severity::Low),
            ..Edit::default()
        };
        let payload = edit.apply(&bug());
        assert_eq!(payload.title, "Crash on save");
        assert_eq!(payload.severity, Severity::Low);
        assert_eq!(payload.reproduction_steps.as_deref(), Some("Press save"));
    }

    #[test]
    fn test_edit_blank_steps_clears_them() {
        let edit = Edit {
            steps: Some("  ".to_string()),
            ..Edit::default()
        };
        assert!(!edit.is_empty());
        assert_eq!(edit.apply(&bug()).reproduction_steps, None);
    }

    #[test]
    fn test_empty_edit() {
        assert!(Edit::default().is_empty());
    }
}
