use crate::output::{print_json, print_table};
use aiwg_core::config::Config;
use aiwg_core::validator::{RegistryValidator, ValidateOptions};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum RegistrySubcommand {
    /// Reconcile registry entries with plugin directories on disk
    Validate {
        /// Skip missing-directory and orphan checks
        #[arg(long)]
        no_fs: bool,
        /// Skip add-on parent framework checks
        #[arg(long)]
        no_refs: bool,
        /// Skip stale health timestamp checks
        #[arg(long)]
        no_health: bool,
    },

    /// Print registered plugin directories that no longer exist
    Missing,

    /// Print plugin directories with no registry entry
    Orphans,
}

pub fn run(root: &Path, subcmd: RegistrySubcommand, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let base = ValidateOptions::from_config(&config);
    match subcmd {
        RegistrySubcommand::Validate {
            no_fs,
            no_refs,
            no_health,
        } => {
            let options = ValidateOptions {
                check_filesystem: !no_fs,
                check_framework_refs: !no_refs,
                check_health: !no_health,
                ..base
            };
            validate(root, options, json)
        }
        RegistrySubcommand::Missing => {
            let ids = RegistryValidator::new(root).with_options(base).get_missing_plugins();
            print_list(&ids, "No missing plugins.", json)
        }
        RegistrySubcommand::Orphans => {
            let paths = RegistryValidator::new(root).with_options(base).get_orphaned_plugins();
            print_list(&paths, "No orphaned directories.", json)
        }
    }
}

fn validate(root: &Path, options: ValidateOptions, json: bool) -> anyhow::Result<()> {
    let report = RegistryValidator::new(root).with_options(options).validate();

    if json {
        print_json(&report)?;
    } else {
        let s = &report.stats;
        println!(
            "{} plugins, {} healthy, {} orphaned, {} invalid references",
            s.total_plugins, s.healthy_plugins, s.orphaned_plugins, s.invalid_refs
        );
        if !report.issues.is_empty() {
            let rows: Vec<Vec<String>> = report
                .issues
                .iter()
                .map(|i| {
                    vec![
                        i.severity.to_string(),
                        i.kind.as_str().to_string(),
                        i.plugin_id.clone(),
                        i.message.clone(),
                    ]
                })
                .collect();
            print_table(&["SEVERITY", "KIND", "PLUGIN", "MESSAGE"], &rows);
        }
    }

    if !report.valid {
        anyhow::bail!("registry is inconsistent");
    }
    Ok(())
}

fn print_list(items: &[String], empty: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("{empty}");
    }
    for item in items {
        println!("{item}");
    }
    Ok(())
}
