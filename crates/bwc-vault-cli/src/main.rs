use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bwc_vault_core::{
	Evidence, EvidenceService, EvidenceStatus, HashAlgorithm, IngestRequest, VaultConfig,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Parser, Debug)]
#[command(name = "bwcvault", version, about = "BWC Vault - Body-Worn Camera Evidence Ledger")]
struct Cli {
	/// Vault directory (defaults to ~/.bwcvault)
	#[arg(long, global = true)]
	storage: Option<PathBuf>,
	/// Hash algorithm for newly ingested evidence
	#[arg(long, global = true, value_parser = ["md5", "sha1", "sha256", "sha512"])]
	algorithm: Option<String>,
	/// JSON configuration file
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Ingest a recording into the vault
	Ingest {
		/// Recording to ingest
		file: PathBuf,
		#[arg(long)]
		case: String,
		#[arg(long)]
		officer: String,
		#[arg(long, default_value = "")]
		officer_name: String,
		#[arg(long, default_value = "")]
		location: String,
		/// Comma-separated tags
		#[arg(long, value_delimiter = ',')]
		tags: Vec<String>,
		/// Recording length in seconds
		#[arg(long)]
		duration: Option<u32>,
	},
	/// Verify the integrity of one evidence item
	Verify {
		id: String,
		#[arg(long)]
		by: String,
	},
	/// Verify every evidence item of a case
	VerifyCase {
		case: String,
		#[arg(long)]
		by: String,
	},
	/// Transfer custody to another officer
	Transfer {
		id: String,
		#[arg(long)]
		from: String,
		#[arg(long)]
		to: String,
		#[arg(long)]
		purpose: String,
	},
	/// Change the lifecycle status
	Status {
		id: String,
		/// COLLECTED, PROCESSING, ANALYZED, ARCHIVED or DELETED
		status: EvidenceStatus,
		#[arg(long)]
		by: String,
		#[arg(long, default_value = "")]
		notes: String,
	},
	/// Replace the tags of an evidence item
	Tag {
		id: String,
		#[arg(long)]
		by: String,
		#[arg(value_delimiter = ',')]
		tags: Vec<String>,
	},
	/// Print the full record as JSON
	Show { id: String },
	/// Print the chain of custody
	Custody { id: String },
	/// Search evidence
	Search {
		#[arg(long, default_value = "")]
		case: String,
		#[arg(long, default_value = "")]
		officer: String,
		#[arg(long)]
		status: Option<EvidenceStatus>,
	},
	/// Export a record as a JSON document
	Export {
		id: String,
		#[arg(long)]
		out: PathBuf,
		#[arg(long)]
		by: String,
	},
	/// Import a record from an export document
	Import {
		file: PathBuf,
		#[arg(long)]
		by: String,
	},
	/// Print the case report
	Report { case: String },
	/// Show audit entries
	Audit {
		#[arg(long, default_value = "")]
		evidence: String,
		#[arg(long, default_value = "")]
		user: String,
		/// Print statistics instead of entries
		#[arg(long)]
		stats: bool,
		/// Write the whole log as JSON
		#[arg(long)]
		export_json: Option<PathBuf>,
		/// Write the whole log as CSV
		#[arg(long)]
		export_csv: Option<PathBuf>,
	},
}

fn load_config(cli: &Cli) -> Result<VaultConfig> {
	let mut config = match &cli.config {
		Some(path) => VaultConfig::from_json_file(path)
			.with_context(|| format!("failed to load config {}", path.display()))?,
		None => {
			let storage = match &cli.storage {
				Some(dir) => dir.clone(),
				None => VaultConfig::default_storage_dir()?,
			};
			VaultConfig::persistent(storage)
		}
	};
	if cli.config.is_some() {
		if let Some(dir) = &cli.storage {
			config.storage_path = dir.clone();
		}
	}
	if let Some(name) = &cli.algorithm {
		config.hash_algorithm = name.parse::<HashAlgorithm>().map_err(anyhow::Error::msg)?;
	}
	Ok(config)
}

fn print_summary(evidence: &Evidence) {
	println!(
		"{}  case={} officer={} status={} custodian={}",
		evidence.id,
		evidence.case_number,
		evidence.officer_id,
		evidence.status,
		evidence.current_custodian().unwrap_or("-")
	);
}

fn main() -> Result<()> {
	// Initialize tracing
	tracing_subscriber::fmt::init();

	let cli = Cli::parse();
	let config = load_config(&cli)?;
	let service = EvidenceService::open_persistent(config)?;

	match cli.command {
		Commands::Ingest { file, case, officer, officer_name, location, tags, duration } => {
			let mut request = IngestRequest::new(case, officer, officer_name, location).with_tags(tags);
			if let Some(seconds) = duration {
				request = request.with_duration(seconds);
			}
			let evidence = service.ingest_file(&file, request)?;

			println!("✅ Evidence ingested");
			println!("🆔 ID: {}", evidence.id);
			println!("🔐 Hash: {} ({})", evidence.file_hash, evidence.hash_algorithm);
			println!("💾 Size: {} bytes", evidence.file_size);
			println!("📁 Stored at: {}", evidence.file_path.display());
		}
		Commands::Verify { id, by } => {
			if service.verify_integrity(&id, &by)? {
				println!("✅ {} verified - hash matches", id);
			} else {
				println!("🚨 {} FAILED verification - possible tampering", id);
				bail!("integrity check failed for {}", id);
			}
		}
		Commands::VerifyCase { case, by } => {
			let spinner = ProgressBar::new_spinner();
			spinner.set_style(
				ProgressStyle::with_template("{spinner} {msg}")
					.unwrap_or_else(|_| ProgressStyle::default_spinner()),
			);
			spinner.set_message(format!("Verifying case {}...", case));
			spinner.enable_steady_tick(Duration::from_millis(100));
			let result = service.verify_case(&case, &by);
			spinner.finish_and_clear();
			let result = result?;

			for item in &result.items {
				match (&item.error, item.is_valid) {
					(Some(err), _) => println!("⚠️  {} unreadable: {}", item.evidence_id, err),
					(None, true) => println!("✅ {}", item.evidence_id),
					(None, false) => println!("🚨 {} compromised", item.evidence_id),
				}
			}
			let summary = &result.summary;
			println!();
			println!("📊 Case {}: {} items", result.case_number, summary.total_items);
			println!("✅ Verified: {}", summary.verified);
			println!("🚨 Compromised: {}", summary.compromised);
			println!("⚠️  Unreadable: {}", summary.unreadable);
			println!("📈 Success rate: {:.1}%", summary.success_rate * 100.0);
		}
		Commands::Transfer { id, from, to, purpose } => {
			service.transfer_custody(&id, &from, &to, &purpose)?;
			println!("✅ Custody of {} transferred {} -> {}", id, from, to);
		}
		Commands::Status { id, status, by, notes } => {
			service.update_status(&id, &by, status, &notes)?;
			println!("✅ {} is now {}", id, status);
		}
		Commands::Tag { id, by, tags } => {
			service.update_tags(&id, &by, tags)?;
			println!("✅ Tags of {} updated", id);
		}
		Commands::Show { id } => {
			let evidence = service.get_evidence(&id)?;
			println!("{}", serde_json::to_string_pretty(&evidence)?);
		}
		Commands::Custody { id } => {
			println!("🔗 Chain of custody for {}", id);
			for (i, entry) in service.chain_of_custody(&id)?.iter().enumerate() {
				println!(
					"  {}. {} {} -> {} ({}) [{}]",
					i + 1,
					entry.timestamp.to_rfc3339(),
					entry.from_officer,
					entry.to_officer,
					entry.action,
					entry.purpose
				);
			}
		}
		Commands::Search { case, officer, status } => {
			let results = service.search(&case, &officer, status)?;
			println!("🔍 {} matching evidence item(s)", results.len());
			for evidence in &results {
				print_summary(evidence);
			}
		}
		Commands::Export { id, out, by } => {
			service.export_evidence(&id, &out, &by)?;
			println!("✅ Exported {} to {}", id, out.display());
		}
		Commands::Import { file, by } => {
			let evidence = service.import_evidence(&file, &by)?;
			println!("✅ Imported {}", evidence.id);
		}
		Commands::Report { case } => {
			print!("{}", service.generate_report(&case)?);
		}
		Commands::Audit { evidence, user, stats, export_json, export_csv } => {
			let log = service.audit_log();
			if let Some(path) = &export_json {
				log.export_json(path)
					.with_context(|| format!("failed to write {}", path.display()))?;
				println!("✅ Audit log written to {}", path.display());
			}
			if let Some(path) = &export_csv {
				log.export_csv(path)
					.with_context(|| format!("failed to write {}", path.display()))?;
				println!("✅ Audit log written to {}", path.display());
			}

			if stats {
				let stats = log.statistics();
				println!("📋 Audit entries: {}", stats.total_entries);
				for (action, count) in &stats.action_counts {
					println!("  {}: {}", action, count);
				}
				if let (Some(first), Some(last)) = (stats.first_entry_time, stats.last_entry_time) {
					println!("🕐 {} .. {}", first.to_rfc3339(), last.to_rfc3339());
				}
			} else if export_json.is_none() && export_csv.is_none() {
				for entry in service.audit_logs(&evidence, &user) {
					println!(
						"#{} {} {} {} {} {}",
						entry.id,
						entry.timestamp.to_rfc3339(),
						entry.user_id,
						entry.action,
						entry.evidence_id,
						entry.details
					);
				}
			}
		}
	}
	Ok(())
}
