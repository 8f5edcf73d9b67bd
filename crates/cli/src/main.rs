use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use conditions_core::config::resolve_data_dir;
use conditions_core::{
    Actor, ClinicalStatus, CodedOrFreeText, ConceptId, Condition, ConditionId, ConditionService,
    CoreConfig, EncounterId, NonEmptyText, PatientId, RecordUuid, UserId, VerificationStatus,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "conditions")]
#[command(about = "Condition record manager CLI")]
struct Cli {
    /// Directory holding condition data
    #[arg(long, env = "CONDITIONS_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// User id recorded as creator, changer or voider
    #[arg(long, env = "CONDITIONS_ACTOR_ID", default_value_t = 1, global = true)]
    actor_id: u64,

    /// Display name of the acting user
    #[arg(long, env = "CONDITIONS_ACTOR_NAME", default_value = "admin", global = true)]
    actor_name: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a condition, or update one when --id is given
    Save(SaveArgs),
    /// Show a condition by id
    Get {
        /// Condition id
        id: u64,
    },
    /// Show a condition by uuid
    GetByUuid {
        /// Condition uuid
        uuid: String,
    },
    /// List a patient's active, non-voided conditions
    Active {
        /// Patient id
        patient: u64,
    },
    /// List all of a patient's conditions, voided ones included
    All {
        /// Patient id
        patient: u64,
    },
    /// List the conditions recorded during an encounter
    ByEncounter {
        /// Encounter id
        encounter: u64,
    },
    /// Void a condition
    Void {
        /// Condition id
        id: u64,
        /// Reason for voiding
        reason: String,
    },
    /// Restore a voided condition
    Unvoid {
        /// Condition id
        id: u64,
    },
    /// Permanently delete a condition
    Purge {
        /// Condition id
        id: u64,
    },
}

#[derive(Args, Debug, Default)]
struct SaveArgs {
    /// Id of an existing condition to update
    #[arg(long)]
    id: Option<u64>,
    /// Owning patient (required when creating)
    #[arg(long)]
    patient: Option<u64>,
    /// Caller-supplied uuid (generated when omitted)
    #[arg(long)]
    uuid: Option<String>,
    #[arg(long)]
    encounter: Option<u64>,
    /// Coded concept id
    #[arg(long)]
    concept: Option<u64>,
    /// Free-text diagnosis
    #[arg(long)]
    non_coded: Option<String>,
    /// ACTIVE, INACTIVE or HISTORY_OF
    #[arg(long)]
    clinical_status: Option<ClinicalStatus>,
    /// PROVISIONAL or CONFIRMED
    #[arg(long)]
    verification_status: Option<VerificationStatus>,
    /// RFC 3339 timestamp
    #[arg(long)]
    onset_date: Option<DateTime<Utc>>,
    /// RFC 3339 timestamp
    #[arg(long)]
    end_date: Option<DateTime<Utc>>,
    #[arg(long)]
    end_reason: Option<String>,
    #[arg(long)]
    additional_detail: Option<String>,
    #[arg(long)]
    form_namespace: Option<String>,
    #[arg(long)]
    form_path: Option<String>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("conditions_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use 'conditions --help' for commands");
        return Ok(());
    };

    let cfg = CoreConfig::new(resolve_data_dir(cli.data_dir))?;
    tracing::debug!("using data directory {}", cfg.data_dir().display());
    let service = ConditionService::with_yaml_store(&cfg)
        .with_context(|| format!("opening store in {}", cfg.data_dir().display()))?;
    let actor = Actor::new(
        UserId(cli.actor_id),
        NonEmptyText::new(&cli.actor_name).context("actor name")?,
    );

    match command {
        Commands::Save(args) => {
            let condition = match args.id {
                Some(id) => require(&service, id)?,
                None => new_condition(&args)?,
            };
            let condition = apply_save_args(condition, &args)?;
            print_json(&service.save_condition(condition, &actor)?)?;
        }
        Commands::Get { id } => print_optional(service.get_condition(ConditionId(id))?)?,
        Commands::GetByUuid { uuid } => print_optional(service.get_condition_by_uuid(&uuid)?)?,
        Commands::Active { patient } => {
            print_json(&service.get_active_conditions(PatientId(patient))?)?
        }
        Commands::All { patient } => print_json(&service.get_all_conditions(PatientId(patient))?)?,
        Commands::ByEncounter { encounter } => {
            print_json(&service.get_conditions_by_encounter(EncounterId(encounter))?)?
        }
        Commands::Void { id, reason } => {
            let condition = require(&service, id)?;
            let reason = NonEmptyText::new(&reason).context("void reason")?;
            print_json(&service.void_condition(&condition, reason, &actor)?)?;
        }
        Commands::Unvoid { id } => {
            let condition = require(&service, id)?;
            print_json(&service.unvoid_condition(&condition)?)?;
        }
        Commands::Purge { id } => {
            let condition = require(&service, id)?;
            service.purge_condition(&condition)?;
            println!("Purged condition {id}");
        }
    }

    Ok(())
}

fn require(service: &ConditionService, id: u64) -> anyhow::Result<Condition> {
    service
        .get_condition(ConditionId(id))?
        .with_context(|| format!("condition {id} not found"))
}

fn new_condition(args: &SaveArgs) -> anyhow::Result<Condition> {
    let Some(patient) = args.patient else {
        bail!("--patient is required when creating a condition");
    };
    let mut condition = Condition::for_patient(PatientId(patient));
    if let Some(uuid) = &args.uuid {
        condition = condition.with_uuid(RecordUuid::parse(uuid)?);
    }
    Ok(condition)
}

/// Applies the options that were given; anything omitted keeps its current value.
fn apply_save_args(mut condition: Condition, args: &SaveArgs) -> anyhow::Result<Condition> {
    if args.id.is_some() && (args.uuid.is_some() || args.patient.is_some()) {
        bail!("--uuid and --patient cannot be changed on an existing condition");
    }

    if let Some(encounter) = args.encounter {
        condition.encounter = Some(EncounterId(encounter));
    }
    let coding = match (args.concept, &args.non_coded) {
        (Some(concept), None) => Some(CodedOrFreeText::coded(ConceptId(concept))),
        (None, Some(text)) => Some(CodedOrFreeText::free_text(text.as_str())),
        (Some(concept), Some(text)) => Some(CodedOrFreeText {
            non_coded: Some(text.clone()),
            ..CodedOrFreeText::coded(ConceptId(concept))
        }),
        (None, None) => None,
    };
    if let Some(coding) = coding {
        condition.condition = coding;
    }
    if args.clinical_status.is_some() {
        condition.clinical_status = args.clinical_status;
    }
    if args.verification_status.is_some() {
        condition.verification_status = args.verification_status;
    }
    if args.onset_date.is_some() {
        condition.onset_date = args.onset_date;
    }
    if args.end_date.is_some() {
        condition.end_date = args.end_date;
    }
    if args.end_reason.is_some() {
        condition.end_reason = args.end_reason.clone();
    }
    if args.additional_detail.is_some() {
        condition.additional_detail = args.additional_detail.clone();
    }
    if args.form_namespace.is_some() || args.form_path.is_some() {
        let namespace = args
            .form_namespace
            .as_deref()
            .or(condition.form_namespace())
            .map(str::to_owned);
        let path = args
            .form_path
            .as_deref()
            .or(condition.form_path())
            .map(str::to_owned);
        condition.set_form_field(namespace.as_deref(), path.as_deref())?;
    }

    Ok(condition)
}

fn print_optional(condition: Option<Condition>) -> anyhow::Result<()> {
    match condition {
        Some(condition) => print_json(&condition),
        None => {
            println!("Condition not found.");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_save_with_statuses() {
        let cli = Cli::try_parse_from([
            "conditions",
            "save",
            "--patient",
            "2",
            "--clinical-status",
            "active",
            "--verification-status",
            "CONFIRMED",
        ])
        .expect("arguments should parse");

        match cli.command {
            Some(Commands::Save(args)) => {
                assert_eq!(args.patient, Some(2));
                assert_eq!(args.clinical_status, Some(ClinicalStatus::Active));
                assert_eq!(args.verification_status, Some(VerificationStatus::Confirmed));
            }
            _ => panic!("expected save command"),
        }
    }

    #[test]
    fn new_condition_requires_patient() {
        let err = new_condition(&SaveArgs::default()).expect_err("patient is required");
        assert!(err.to_string().contains("--patient"));
    }

    #[test]
    fn apply_save_args_sets_form_field_and_coding() {
        let args = SaveArgs {
            patient: Some(2),
            concept: Some(5497),
            form_namespace: Some("my ns".into()),
            form_path: Some("my path".into()),
            ..SaveArgs::default()
        };

        let condition = apply_save_args(new_condition(&args).unwrap(), &args).unwrap();
        assert_eq!(condition.condition.coded, Some(ConceptId(5497)));
        assert_eq!(
            condition.form_namespace_and_path().as_deref(),
            Some("my ns^my path")
        );
    }

    #[test]
    fn apply_save_args_records_free_text_condition() {
        let args = SaveArgs {
            patient: Some(2),
            non_coded: Some("Seasonal hay fever".into()),
            ..SaveArgs::default()
        };

        let condition = apply_save_args(new_condition(&args).unwrap(), &args).unwrap();
        assert_eq!(condition.condition.coded, None);
        assert_eq!(
            condition.condition.non_coded.as_deref(),
            Some("Seasonal hay fever")
        );
    }

    #[test]
    fn apply_save_args_keeps_unspecified_fields() {
        let mut existing = Condition::for_patient(PatientId(2));
        existing.clinical_status = Some(ClinicalStatus::Inactive);
        existing.end_reason = Some("resolved".into());

        let args = SaveArgs {
            id: Some(1),
            verification_status: Some(VerificationStatus::Confirmed),
            ..SaveArgs::default()
        };
        let updated = apply_save_args(existing, &args).unwrap();

        assert_eq!(updated.clinical_status, Some(ClinicalStatus::Inactive));
        assert_eq!(updated.verification_status, Some(VerificationStatus::Confirmed));
        assert_eq!(updated.end_reason.as_deref(), Some("resolved"));
    }

    #[test]
    fn apply_save_args_rejects_patient_change_on_update() {
        let args = SaveArgs {
            id: Some(1),
            patient: Some(3),
            ..SaveArgs::default()
        };
        let err = apply_save_args(Condition::for_patient(PatientId(2)), &args)
            .expect_err("patient is immutable");
        assert!(err.to_string().contains("cannot be changed"));
    }
}
