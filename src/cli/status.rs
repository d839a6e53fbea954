use std::{collections::BTreeMap, path::PathBuf, process};

use clap::Parser;
use relalloc::Worksheet;
use tracing::instrument;

use super::terminal::{is_narrow, Colorize};

#[derive(Debug, Parser, Default)]
#[command(about = "Show record counts, goal coverage, and tree health")]
pub struct Status {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress headers and format for scripting
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Status {
    #[instrument(level = "debug", skip(self))]
    pub fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let worksheet = Worksheet::open(root)?;
        let tree = worksheet.tree();

        let mut by_method: BTreeMap<String, usize> = BTreeMap::new();
        let mut allocated = 0;
        let mut excluded = 0;
        for node in tree.iter() {
            *by_method.entry(node.method.to_string()).or_insert(0) += 1;
            if node.reliability_alloc.is_some() {
                allocated += 1;
            }
            if !node.included {
                excluded += 1;
            }
        }

        let total = tree.len();
        let roots: Vec<String> = tree.roots().iter().map(ToString::to_string).collect();
        let cycles = tree.has_cycles();

        if total == 0 {
            println!("No allocation records found yet. Create one with 'ralloc add'.");
            return Ok(());
        }

        match self.output {
            OutputFormat::Json => {
                Self::output_json(&by_method, total, allocated, excluded, &roots, cycles)?;
            }
            OutputFormat::Table => {
                if self.quiet {
                    Self::output_quiet(total, allocated, excluded);
                } else {
                    Self::output_table(&by_method, total, allocated, excluded, &roots, cycles);
                }
            }
        }

        // A cyclic structure means the worksheet was edited by hand into an
        // unusable state.
        if cycles {
            process::exit(3);
        }

        Ok(())
    }

    fn output_json(
        by_method: &BTreeMap<String, usize>,
        total: usize,
        allocated: usize,
        excluded: usize,
        roots: &[String],
        cycles: bool,
    ) -> anyhow::Result<()> {
        use serde_json::json;

        let methods: Vec<_> = by_method
            .iter()
            .map(|(method, count)| {
                json!({
                    "method": method,
                    "count": count,
                })
            })
            .collect();

        let output = json!({
            "methods": methods,
            "total": total,
            "allocated": allocated,
            "excluded": excluded,
            "roots": roots,
            "cycles": cycles,
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_quiet(total: usize, allocated: usize, excluded: usize) {
        println!("total={total} allocated={allocated} excluded={excluded}");
    }

    fn output_table(
        by_method: &BTreeMap<String, usize>,
        total: usize,
        allocated: usize,
        excluded: usize,
        roots: &[String],
        cycles: bool,
    ) {
        let narrow = is_narrow();

        println!("Allocation records");
        println!("{}", "──────────────────".dim());

        if narrow {
            for (method, count) in by_method {
                println!("{method}: {count}");
            }
            println!("Total: {total}");
        } else {
            println!("{:<10} Count", "Method");
            for (method, count) in by_method {
                println!("{method:<10} {count}");
            }
            println!("Total      {total}");
        }

        println!();
        println!("Roots: {}", roots.join(", "));
        println!("Allocated: {allocated} of {total}");
        if excluded > 0 {
            println!("Excluded from allocation: {excluded}");
        }

        println!();
        if cycles {
            println!("Structure: {} ⚠️", "cyclic".warning());
            println!(
                "{}",
                "Fix the parent links before running an allocation.".dim()
            );
        } else {
            println!("Structure: {} ✅", "tree".success());
        }
    }
}
