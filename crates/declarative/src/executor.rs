//! Execution engine - runs compiled statements serially

use crate::context::{DataProvider, ProgressCallback, SessionContext};
use crate::error::{Error, ErrorCode, ProviderError, Result};
use crate::kind::Kind;
use crate::planner::Plan;
use crate::types::{Action, ExecuteOptions, ExecuteSummary, StatementOutcome};

/// Refuse plans that drop the user running them
pub fn check_session_user(plan: &Plan, session: &SessionContext) -> Result<()> {
    let drops_self = plan.changes().iter().any(|c| {
        c.action == Action::Remove && c.urn.kind == Kind::User && *c.urn.name() == session.user
    });
    if drops_self {
        return Err(Error::DropsSessionUser {
            user: session.user.to_string(),
        });
    }
    Ok(())
}

/// Whether a failed statement can be treated as already applied
fn is_idempotent(error: &ProviderError, statement: &str, opts: &ExecuteOptions) -> bool {
    match error.code {
        ErrorCode::AlreadyExists | ErrorCode::InvalidGrant => true,
        ErrorCode::DoesNotExist => {
            opts.tolerate_missing
                || statement
                    .trim_start()
                    .get(..6)
                    .is_some_and(|verb| verb.eq_ignore_ascii_case("REVOKE"))
        }
        ErrorCode::Other(_) => false,
    }
}

/// Execute statements one at a time
///
/// Cancellation is checked before each statement. The first error that is
/// not idempotent stops execution.
pub fn execute<P: ProgressCallback>(
    statements: &[String],
    provider: &dyn DataProvider,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<ExecuteSummary> {
    let mut summary = ExecuteSummary::default();
    progress.on_start(statements.len());

    for (index, statement) in statements.iter().enumerate() {
        if opts.cancel.is_cancelled() {
            log::warn!("cancelled with {} statements remaining", statements.len() - index);
            return Err(Error::Cancelled {
                executed: summary.statements,
                remaining: statements[index..].to_vec(),
            });
        }

        progress.on_statement_start(index, statement);

        let outcome = if opts.dry_run {
            StatementOutcome::DryRun
        } else {
            match provider.execute(statement) {
                Ok(()) => {
                    log::info!("{}", statement);
                    StatementOutcome::Executed
                }
                Err(error) if is_idempotent(&error, statement, opts) => {
                    log::warn!("skipping {}: {}", statement, error);
                    StatementOutcome::Skipped { error }
                }
                Err(error) => {
                    log::error!("{} failed: {}", statement, error);
                    return Err(Error::Execution {
                        statement: statement.clone(),
                        error,
                        executed: summary.statements,
                    });
                }
            }
        };

        summary.add_result(statement, &outcome);
        progress.on_statement_complete(statement, &outcome);
    }

    progress.on_complete();
    Ok(summary)
}

/// Execute without progress reporting
pub fn execute_simple(
    statements: &[String],
    provider: &dyn DataProvider,
    opts: &ExecuteOptions,
) -> Result<ExecuteSummary> {
    use crate::context::NoProgress;

    execute(statements, provider, opts, &mut NoProgress)
}
