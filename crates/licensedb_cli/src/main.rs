//! licensedb CLI: the `licensedb` command.
//!
//! # Responsibility
//! - Open a store from flags or a TOML config.
//! - Expose maintenance tasks (stats, symmetry check, repair, legacy import).

mod cli;

use clap::Parser;
use cli::{Cli, Commands, StoreArgs};
use licensedb_core::model::relation::{LICENSES, SYSTEMS, USERS, VENDORS};
use licensedb_core::store::legacy::import_legacy_combined;
use licensedb_core::{
    init_from_config, Backend, Database, Filter, RelationshipService, StoreConfig,
};
use log::error;
use serde_json::json;
use std::process;

const COLLECTIONS: [&str; 4] = [LICENSES, SYSTEMS, USERS, VENDORS];

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ping => {
            println!("licensedb_core ping={}", licensedb_core::ping());
            println!("licensedb_core version={}", licensedb_core::core_version());
            Ok(())
        }
        Commands::Stats { store, json } => open(&store).and_then(|db| stats(&db, json)),
        Commands::Check { store, json } => open(&store).and_then(|db| check(&db, json)),
        Commands::Repair { store, json } => open(&store).and_then(|db| repair(&db, json)),
        Commands::ImportLegacy { file, store } => open(&store).and_then(|db| {
            let report = import_legacy_combined(&file, &db).map_err(|err| err.to_string())?;
            for (name, count) in &report.imported {
                println!("imported {name}: {count}");
            }
            for name in &report.skipped {
                println!("skipped {name}: collection is not empty");
            }
            if let Some(repair) = report.repair {
                println!(
                    "repaired relationships: requirements added={} removed={} dangling_dropped={}",
                    repair.outcome.requirements_added,
                    repair.outcome.requirements_removed,
                    repair.outcome.dangling_dropped
                );
            }
            Ok(())
        }),
    };

    if let Err(message) = result {
        error!("event=cli_command module=cli status=error error={message}");
        eprintln!("error: {message}");
        process::exit(1);
    }
}

fn open(args: &StoreArgs) -> Result<Database, String> {
    let config = match &args.config {
        Some(path) => StoreConfig::load(path).map_err(|err| err.to_string())?,
        None if args.sqlite => StoreConfig::sqlite(&args.data_dir),
        None => StoreConfig::json(&args.data_dir),
    };
    init_from_config(&config)?;
    Database::open(&config).map_err(|err| err.to_string())
}

fn stats(db: &Database, as_json: bool) -> Result<(), String> {
    let mut counts = serde_json::Map::new();
    for name in COLLECTIONS {
        let count = db
            .collection(name)
            .count(&Filter::new())
            .map_err(|err| err.to_string())?;
        counts.insert(name.to_string(), json!(count));
    }

    if as_json {
        let payload = json!({"backend": db.kind().as_str(), "collections": counts});
        println!("{payload}");
    } else {
        println!("backend={}", db.kind());
        for (name, count) in &counts {
            println!("{name}={count}");
        }
    }
    Ok(())
}

fn check(db: &Database, as_json: bool) -> Result<(), String> {
    let violations = RelationshipService::new(db)
        .check()
        .map_err(|err| err.to_string())?;

    if as_json {
        let items: Vec<String> = violations.iter().map(ToString::to_string).collect();
        println!("{}", json!({"ok": violations.is_empty(), "violations": items}));
    } else if violations.is_empty() {
        println!("ok: licenses and systems are symmetric");
    } else {
        for violation in &violations {
            println!("{violation}");
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(format!("{} symmetry violation(s)", violations.len()))
    }
}

fn repair(db: &Database, as_json: bool) -> Result<(), String> {
    let report = RelationshipService::new(db)
        .repair()
        .map_err(|err| err.to_string())?;
    let outcome = report.outcome;

    if as_json {
        println!(
            "{}",
            json!({
                "licensesChecked": report.licenses_checked,
                "systemsChecked": report.systems_checked,
                "requirementsAdded": outcome.requirements_added,
                "requirementsRemoved": outcome.requirements_removed,
                "danglingDropped": outcome.dangling_dropped,
                "duplicatesCollapsed": outcome.duplicates_collapsed,
            })
        );
    } else {
        println!(
            "checked licenses={} systems={}",
            report.licenses_checked, report.systems_checked
        );
        println!(
            "requirements added={} removed={} dangling_dropped={} duplicates_collapsed={}",
            outcome.requirements_added,
            outcome.requirements_removed,
            outcome.dangling_dropped,
            outcome.duplicates_collapsed
        );
    }
    Ok(())
}
