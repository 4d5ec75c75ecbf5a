use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fiche_workflow::domain::lifecycle::EDGES;
use fiche_workflow::domain::permissions::{capabilities, Actor, Role};
use fiche_workflow::domain::types::{Amount, CaseFileId, ReferenceCode, SessionId};
use fiche_workflow::domain::{CaseFileDraft, ContractParty, DraftChanges, LifecycleState};
use fiche_workflow::effects::DocumentMetadata;
use fiche_workflow::service::{TransitionRequest, WorkflowService};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fiches")]
#[command(about = "Case file workflow for family support engagements")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Id of the acting user
    #[arg(long, global = true)]
    pub actor: Option<String>,

    /// Role of the acting user (administrator, project_oversight, issuer, ...)
    #[arg(long, global = true)]
    pub role: Option<String>,

    /// Organization the acting user works for
    #[arg(long, global = true)]
    pub org: Option<String>,

    /// Territory covered by the acting user (repeatable)
    #[arg(long = "territory", global = true)]
    pub territories: Vec<String>,

    /// Configuration file (defaults to <data dir>/fiches.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the configuration)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open a new case file in DRAFT
    Create {
        /// Department code of the family
        #[arg(long)]
        department: Option<String>,
        /// Participant data as a JSON document
        #[arg(long)]
        payload: Option<String>,
        /// Total amount in cents
        #[arg(long, default_value = "0")]
        amount: u64,
    },

    /// Edit a DRAFT or NEEDS_INFO case file
    Update {
        id: String,
        #[arg(long)]
        department: Option<String>,
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        amount: Option<u64>,
        #[arg(long)]
        expect_version: Option<u64>,
    },

    /// Move a case file to another state
    Transition {
        id: String,
        /// Target state, e.g. SUBMITTED_TO_FEVES
        to: String,
        /// Audit metadata as key=value (repeatable)
        #[arg(long = "meta")]
        metadata: Vec<String>,
        #[arg(long)]
        expect_version: Option<u64>,
    },

    /// Assign a field organization to a submitted case file
    Assign {
        id: String,
        organization: String,
        #[arg(long)]
        expect_version: Option<u64>,
    },

    /// Return an EVS_REJECTED case file for a new assignment
    Reopen { id: String },

    /// Link a case file to a workshop session
    LinkSession { id: String, session: String },

    /// Show a case file by id or reference code
    Show { id: String },

    /// List visible case files
    List {
        #[arg(long)]
        state: Option<String>,
    },

    /// Show the audit trail of a case file
    Audit { id: String },

    /// Open a workshop session
    SessionCreate {
        label: String,
        #[arg(long)]
        min: u32,
        #[arg(long)]
        max: u32,
    },

    /// Record a contract signature on a session
    SessionSign {
        session: String,
        /// EVS or MUNICIPALITY
        party: String,
        /// Signed contract to store with the municipality signature
        #[arg(long)]
        document: Option<PathBuf>,
        /// Ask to withdraw the signature instead
        #[arg(long)]
        withdraw: bool,
    },

    /// Declare the session activity done
    SessionDone { session: String },

    /// Undo a wrongly declared activity
    SessionRevert { session: String },

    /// Show one workshop session
    SessionShow { session: String },

    /// List workshop sessions
    SessionList,

    /// Retry side effects parked in the outbox
    OutboxRetry,

    /// Print the lifecycle graph and the capabilities of a role
    Policy {
        #[arg(long = "of")]
        of_role: Option<String>,
    },
}

impl Cli {
    fn acting(&self) -> Result<Actor> {
        let (Some(id), Some(role)) = (&self.actor, &self.role) else {
            anyhow::bail!("this command needs --actor and --role");
        };
        let role: Role = role.parse()?;
        let mut actor = Actor::new(id.as_str(), role);
        if let Some(org) = &self.org {
            actor = actor.with_organization(org.as_str());
        }
        for territory in &self.territories {
            actor = actor.with_territory(territory.as_str());
        }
        Ok(actor)
    }
}

fn case_file_id(s: &str) -> Result<CaseFileId> {
    CaseFileId::from_string(s).with_context(|| format!("'{}' is not a case file id", s))
}

fn session_id(s: &str) -> Result<SessionId> {
    SessionId::from_string(s).with_context(|| format!("'{}' is not a session id", s))
}

fn json_arg(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("--payload must be a JSON document")
}

fn metadata_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .with_context(|| format!("--meta '{}' must be key=value", pair))
        })
        .collect()
}

fn policy(role: Option<Role>) -> Value {
    let edges: Vec<Value> = EDGES
        .iter()
        .filter(|edge| match role {
            Some(role) => capabilities(role).contains(&edge.capability),
            None => true,
        })
        .map(|edge| {
            json!({
                "from": edge.from,
                "to": edge.to,
                "capability": edge.capability,
                "milestone": edge.milestone,
                "notify": edge.notify,
            })
        })
        .collect();
    match role {
        Some(role) => json!({
            "role": role,
            "capabilities": capabilities(role),
            "edges": edges,
        }),
        None => json!({ "edges": edges }),
    }
}

/// Runs one subcommand and returns what to print.
pub async fn run(cli: &Cli, service: &WorkflowService) -> Result<Value> {
    let value = match &cli.command {
        Command::Policy { of_role } => {
            let role = of_role.as_deref().map(str::parse::<Role>).transpose()?;
            return Ok(policy(role));
        }
        Command::OutboxRetry => serde_json::to_value(service.retry_outbox().await?)?,

        Command::Create {
            department,
            payload,
            amount,
        } => {
            let draft = CaseFileDraft {
                territory: department.as_deref().map(Into::into),
                payload: payload.as_deref().map(json_arg).transpose()?.unwrap_or(Value::Null),
                total_amount: Amount(*amount),
            };
            serde_json::to_value(service.create_case_file(&cli.acting()?, draft).await?)?
        }
        Command::Update {
            id,
            department,
            payload,
            amount,
            expect_version,
        } => {
            let changes = DraftChanges {
                territory: department.as_deref().map(Into::into),
                payload: payload.as_deref().map(json_arg).transpose()?,
                total_amount: amount.map(Amount),
            };
            let outcome = service
                .update_draft(&cli.acting()?, &case_file_id(id)?, changes, *expect_version)
                .await?;
            serde_json::to_value(outcome)?
        }
        Command::Transition {
            id,
            to,
            metadata,
            expect_version,
        } => {
            let request = TransitionRequest {
                to: to.parse::<LifecycleState>()?,
                metadata: metadata_pairs(metadata)?,
                expected_version: *expect_version,
            };
            let outcome = service
                .request_transition(&cli.acting()?, &case_file_id(id)?, request)
                .await?;
            serde_json::to_value(outcome)?
        }
        Command::Assign {
            id,
            organization,
            expect_version,
        } => {
            let outcome = service
                .assign_organization(
                    &cli.acting()?,
                    &case_file_id(id)?,
                    organization.as_str().into(),
                    *expect_version,
                )
                .await?;
            serde_json::to_value(outcome)?
        }
        Command::Reopen { id } => serde_json::to_value(
            service
                .reopen_for_reassignment(&cli.acting()?, &case_file_id(id)?)
                .await?,
        )?,
        Command::LinkSession { id, session } => serde_json::to_value(
            service
                .link_workshop_session(&cli.acting()?, &case_file_id(id)?, &session_id(session)?)
                .await?,
        )?,
        Command::Show { id } => {
            let actor = cli.acting()?;
            let view = if ReferenceCode::is_well_formed(&id.trim().to_uppercase()) {
                service
                    .find_by_reference(&actor, &id.parse::<ReferenceCode>()?)
                    .await?
            } else {
                service.get_case_file(&actor, &case_file_id(id)?).await?
            };
            serde_json::to_value(view)?
        }
        Command::List { state } => {
            let state = state.as_deref().map(str::parse::<LifecycleState>).transpose()?;
            serde_json::to_value(service.list_case_files(&cli.acting()?, state)?)?
        }
        Command::Audit { id } => serde_json::to_value(
            service
                .case_file_audit(&cli.acting()?, &case_file_id(id)?)
                .await?,
        )?,

        Command::SessionCreate { label, min, max } => serde_json::to_value(
            service
                .create_session(&cli.acting()?, label, *min, *max)
                .await?,
        )?,
        Command::SessionSign {
            session,
            party,
            document,
            withdraw,
        } => {
            let actor = cli.acting()?;
            let id = session_id(session)?;
            let party: ContractParty = party.parse()?;
            let outcome = match document {
                Some(path) => {
                    if party != ContractParty::Municipality || *withdraw {
                        anyhow::bail!("--document only goes with a MUNICIPALITY signature");
                    }
                    let blob = tokio::fs::read(path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let metadata = DocumentMetadata {
                        file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
                        ..DocumentMetadata::default()
                    };
                    service
                        .attach_contract_document(&actor, &id, &blob, metadata)
                        .await?
                }
                None => {
                    service
                        .record_contract_signature(&actor, &id, party, !*withdraw, None)
                        .await?
                }
            };
            serde_json::to_value(outcome)?
        }
        Command::SessionDone { session } => serde_json::to_value(
            service
                .mark_activity_done(&cli.acting()?, &session_id(session)?)
                .await?,
        )?,
        Command::SessionRevert { session } => serde_json::to_value(
            service
                .revert_activity_done(&cli.acting()?, &session_id(session)?)
                .await?,
        )?,
        Command::SessionShow { session } => serde_json::to_value(
            service
                .get_session(&cli.acting()?, &session_id(session)?)
                .await?,
        )?,
        Command::SessionList => serde_json::to_value(service.list_sessions(&cli.acting()?)?)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_actor_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fiches",
            "list",
            "--actor",
            "evs-user",
            "--role",
            "field_organization",
            "--org",
            "evs-1",
        ])
        .unwrap();
        let actor = cli.acting().unwrap();
        assert_eq!(actor.role, Role::FieldOrganization);
        assert_eq!(
            actor.context.organization_id.as_ref().map(|o| o.as_str()),
            Some("evs-1")
        );
    }

    #[test]
    fn test_missing_actor_is_an_error() {
        let cli = Cli::try_parse_from(["fiches", "session-list"]).unwrap();
        assert!(cli.acting().is_err());
    }

    #[test]
    fn test_metadata_pairs() {
        let pairs = metadata_pairs(&["comment=ok".to_string(), "ticket = 42".to_string()]).unwrap();
        assert_eq!(pairs.get("comment").map(String::as_str), Some("ok"));
        assert_eq!(pairs.get("ticket").map(String::as_str), Some(" 42"));
        assert!(metadata_pairs(&["nokey".to_string()]).is_err());
    }

    #[test]
    fn test_policy_for_role_lists_only_its_edges() {
        let all = policy(None);
        assert_eq!(all["edges"].as_array().unwrap().len(), EDGES.len());

        let issuer = policy(Some(Role::Issuer));
        let edges = issuer["edges"].as_array().unwrap();
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e["to"] == "SUBMITTED_TO_FEVES"));
    }

    #[tokio::test]
    async fn test_run_create_then_show_by_reference() {
        let dir = tempfile::tempdir().unwrap();
        let service = WorkflowService::new(dir.path(), 0, 3);
        let args = ["--actor", "issuer-1", "--role", "issuer"];

        let create = Cli::try_parse_from(
            ["fiches", "create", "--department", "59", "--amount", "50000"]
                .into_iter()
                .chain(args),
        )
        .unwrap();
        let created = run(&create, &service).await.unwrap();
        let reference = created["case_file"]["reference"].as_str().unwrap().to_string();

        let show = Cli::try_parse_from(
            ["fiches", "show", reference.as_str()].into_iter().chain(args),
        )
        .unwrap();
        let shown = run(&show, &service).await.unwrap();
        assert_eq!(shown["state"], "DRAFT");
        assert_eq!(shown["id"], created["case_file"]["id"]);
    }
}
