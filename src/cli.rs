use std::path::PathBuf;

mod status;
mod terminal;

use clap::ArgAction;
use indicatif::ProgressBar;
use relalloc::{
    storage::config_path, AllocationConfig, AllocationNode, AllocationReport, AllocationTree,
    HardwareId, Method, Outcome, Worksheet,
};
use status::Status;
use terminal::Colorize;
use tracing::instrument;

/// Parse a hardware id from a string.
///
/// This is a CLI boundary function that accepts both the bare number and
/// the `HW-<id>` display form.
fn parse_hardware_id(s: &str) -> Result<HardwareId, String> {
    s.parse().map_err(|e| format!("{e}"))
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the worksheet directory
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command
            .unwrap_or_else(|| Command::Status(Status::default()))
            .run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Show worksheet status (default)
    Status(Status),

    /// Initialize a new allocation worksheet
    Init,

    /// Add a hardware item to the allocation scope
    Add(Add),

    /// Remove a hardware item from the allocation scope
    Remove(Remove),

    /// Set a node's goal and derive the other two goal measures
    Goal(Goal),

    /// Apportion a parent's goal over its children
    Allocate(Allocate),

    /// Seed each child's goal from its allocated value
    Trickle(Trickle),

    /// Allocate a whole subtree, level by level
    Cascade(Cascade),

    /// Show or modify configuration settings
    Config(Config),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Status(command) => command.run(root)?,
            Self::Init => Init::run(&root)?,
            Self::Add(command) => command.run(root)?,
            Self::Remove(command) => command.run(root)?,
            Self::Goal(command) => command.run(root)?,
            Self::Allocate(command) => command.run(root)?,
            Self::Trickle(command) => command.run(root)?,
            Self::Cascade(command) => command.run(root)?,
            Self::Config(command) => command.run(&root)?,
        }
        Ok(())
    }
}

/// CLI spelling of the apportionment methods.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum MethodArg {
    #[default]
    None,
    Equal,
    Agree,
    Arinc,
    Foo,
}

impl From<MethodArg> for Method {
    fn from(value: MethodArg) -> Self {
        match value {
            MethodArg::None => Self::None,
            MethodArg::Equal => Self::Equal,
            MethodArg::Agree => Self::Agree,
            MethodArg::Arinc => Self::Arinc,
            MethodArg::Foo => Self::Foo,
        }
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum ReportFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, clap::Parser)]
pub struct Init {}

impl Init {
    #[instrument]
    fn run(root: &PathBuf) -> anyhow::Result<()> {
        use std::fs;

        let meta_dir = root.join(".ralloc");
        if meta_dir.exists() {
            anyhow::bail!("Worksheet already initialized (found existing .ralloc directory)");
        }

        fs::create_dir_all(&meta_dir)
            .map_err(|e| anyhow::anyhow!("Failed to create .ralloc directory: {e}"))?;

        let config = AllocationConfig::default();
        config
            .save(&config_path(root))
            .map_err(|e| anyhow::anyhow!("Failed to create config.toml: {e}"))?;

        println!("Initialized allocation worksheet in {}", root.display());
        println!("  Created: .ralloc/config.toml");
        println!();
        println!("Next steps:");
        println!("  ralloc add 1 --method equal");
        println!("  ralloc add 2 --parent 1");
        println!("  ralloc goal 1 --reliability 0.95");
        println!("  ralloc allocate 1 --trickle");

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Add {
    /// The hardware id of the new record (e.g. 4 or HW-4)
    #[clap(value_parser = parse_hardware_id)]
    id: HardwareId,

    /// The hardware id of the parent record
    #[clap(long, short, value_parser = parse_hardware_id)]
    parent: Option<HardwareId>,

    /// The apportionment method this node applies to its children
    #[clap(long, value_enum, default_value = "none")]
    method: MethodArg,

    /// Mission time for this node
    #[clap(long)]
    mission_time: Option<f64>,

    /// Duty cycle (percent) for this node
    #[clap(long)]
    duty_cycle: Option<f64>,

    /// The node's operating hazard rate (used by ARINC)
    #[clap(long)]
    hazard_rate: Option<f64>,

    /// Structural weighting factor (used by AGREE)
    #[clap(long)]
    weight_factor: Option<f64>,

    /// Number of subsystems comprising this item
    #[clap(long)]
    n_sub_systems: Option<u32>,

    /// Number of sub-elements comprising this item (used by AGREE)
    #[clap(long)]
    n_sub_elements: Option<u32>,

    /// Intricacy risk factor (used by FOO)
    #[clap(long)]
    int_factor: Option<u32>,

    /// State-of-the-art risk factor (used by FOO)
    #[clap(long)]
    soa_factor: Option<u32>,

    /// Operating-time risk factor (used by FOO)
    #[clap(long)]
    op_time_factor: Option<u32>,

    /// Environment risk factor (used by FOO)
    #[clap(long)]
    env_factor: Option<u32>,

    /// Keep the node in the tree but out of apportionment
    #[clap(long)]
    excluded: bool,
}

impl Add {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut worksheet = Worksheet::open(root)?;

        let mut node = AllocationNode::new(self.id);
        node.parent_id = self.parent;
        node.method = self.method.into();
        node.mission_time = self.mission_time;
        node.duty_cycle = self.duty_cycle;
        node.included = !self.excluded;
        if let Some(value) = self.hazard_rate {
            node.hazard_rate = value;
        }
        if let Some(value) = self.weight_factor {
            node.weight_factor = value;
        }
        if let Some(value) = self.n_sub_systems {
            node.n_sub_systems = value;
        }
        if let Some(value) = self.n_sub_elements {
            node.n_sub_elements = value;
        }
        if let Some(value) = self.int_factor {
            node.int_factor = value;
        }
        if let Some(value) = self.soa_factor {
            node.soa_factor = value;
        }
        if let Some(value) = self.op_time_factor {
            node.op_time_factor = value;
        }
        if let Some(value) = self.env_factor {
            node.env_factor = value;
        }

        worksheet.add_node(node)?;
        worksheet.flush()?;

        match self.parent {
            Some(parent) => println!("Added {} under {parent}", self.id),
            None => println!("Added {} as a root", self.id),
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Remove {
    /// The hardware id of the record to remove
    #[clap(value_parser = parse_hardware_id)]
    id: HardwareId,

    /// Skip confirmation prompts
    #[arg(long, short)]
    yes: bool,
}

impl Remove {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut worksheet = Worksheet::open(root)?;

        if !worksheet.tree().contains(self.id) {
            anyhow::bail!("Record {} not found", self.id);
        }
        let children: Vec<HardwareId> = worksheet.tree().children(self.id).collect();

        if !children.is_empty() && !self.yes {
            println!(
                "{}",
                format!(
                    "⚠️  {} has {} children; they will become roots",
                    self.id,
                    children.len()
                )
                .warning()
            );
            eprint!("\nProceed? (y/N) ");
            use std::io::{self, BufRead};
            let stdin = io::stdin();
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
            if !line.trim().eq_ignore_ascii_case("y") {
                println!("Cancelled");
                std::process::exit(130);
            }
        }

        worksheet.remove_node(self.id)?;
        worksheet.flush()?;

        println!("{}", format!("✅ Removed {}", self.id).success());
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Goal {
    /// The hardware id of the record to set the goal on
    #[clap(value_parser = parse_hardware_id)]
    id: HardwareId,

    /// Reliability goal, strictly between 0 and 1
    #[clap(long)]
    reliability: Option<f64>,

    /// Hazard-rate goal (failures per unit time)
    #[clap(long)]
    hazard_rate: Option<f64>,

    /// MTBF goal
    #[clap(long)]
    mtbf: Option<f64>,

    /// Also set the node's mission time
    #[clap(long)]
    mission_time: Option<f64>,
}

impl Goal {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let selected = [
            self.reliability.is_some(),
            self.hazard_rate.is_some(),
            self.mtbf.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if selected != 1 {
            anyhow::bail!("Provide exactly one of --reliability, --hazard-rate, or --mtbf");
        }

        let mut worksheet = Worksheet::open(root)?;
        {
            let node = worksheet
                .tree_mut()
                .get_mut(self.id)
                .ok_or_else(|| anyhow::anyhow!("Record {} not found", self.id))?;

            if let Some(value) = self.mission_time {
                node.mission_time = Some(value);
            }
            if let Some(value) = self.reliability {
                node.set_reliability_goal(value)?;
            } else if let Some(value) = self.hazard_rate {
                node.set_hazard_rate_goal(value);
            } else if let Some(value) = self.mtbf {
                node.set_mtbf_goal(value);
            }
        }

        worksheet.engine().calculate_goals(self.id)?;
        worksheet.flush()?;

        let node = worksheet
            .tree()
            .get(self.id)
            .expect("record was just edited");
        println!("Goals for {} ({}):", self.id, node.goal_measure);
        println!("  reliability:  {:.6}", node.reliability_goal);
        println!("  hazard rate:  {:.6e}", node.hazard_rate_goal);
        println!("  mtbf:         {:.2}", node.mtbf_goal);
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Allocate {
    /// The parent whose goal is apportioned
    #[clap(value_parser = parse_hardware_id)]
    parent: HardwareId,

    /// Also seed each child's goal from its allocation
    #[arg(long)]
    trickle: bool,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    format: ReportFormat,

    /// Suppress per-child output
    #[arg(long, short)]
    quiet: bool,
}

impl Allocate {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut worksheet = Worksheet::open(root)?;

        let report = worksheet.engine().allocate(self.parent)?;
        if self.trickle {
            worksheet.engine().trickle_down(self.parent)?;
        }
        worksheet.flush()?;

        if report.is_empty() {
            println!("{} has no participating children; nothing to do.", self.parent);
            return Ok(());
        }

        if !self.quiet {
            match self.format {
                ReportFormat::Json => print_report_json(&report, worksheet.tree())?,
                ReportFormat::Table => print_report_table(&report, worksheet.tree()),
            }
        }

        // Exit with code 2 when any child failed (for CI).
        if report.has_failures() {
            std::process::exit(2);
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Trickle {
    /// The parent whose children receive their seeded goals
    #[clap(value_parser = parse_hardware_id)]
    parent: HardwareId,
}

impl Trickle {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut worksheet = Worksheet::open(root)?;
        worksheet.engine().trickle_down(self.parent)?;
        worksheet.flush()?;

        println!("Seeded child goals under {}", self.parent);
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Cascade {
    /// Root of the subtree to allocate; defaults to every root
    #[clap(value_parser = parse_hardware_id)]
    root: Option<HardwareId>,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    format: ReportFormat,

    /// Only print the summary line
    #[arg(long, short)]
    quiet: bool,
}

impl Cascade {
    #[instrument]
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        let mut worksheet = Worksheet::open(root)?;

        let starts = match self.root {
            Some(id) => vec![id],
            None => worksheet.tree().roots(),
        };
        if starts.is_empty() {
            anyhow::bail!("No allocation records found");
        }

        let bar = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(worksheet.tree().len() as u64)
        };

        let mut reports: Vec<AllocationReport> = Vec::new();
        for start in starts {
            for report in worksheet.engine().cascade(start)? {
                bar.inc(report.len() as u64);
                reports.push(report);
            }
        }
        bar.finish_and_clear();

        worksheet.flush()?;

        if !self.quiet {
            match self.format {
                ReportFormat::Json => {
                    let values: Vec<serde_json::Value> = reports
                        .iter()
                        .map(|report| report_json(report, worksheet.tree()))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&values)?);
                }
                ReportFormat::Table => {
                    for report in &reports {
                        print_report_table(report, worksheet.tree());
                        println!();
                    }
                }
            }
        }

        let allocated: usize = reports.iter().map(AllocationReport::allocated_count).sum();
        let failures: usize = reports.iter().map(|report| report.failures().count()).sum();
        if failures == 0 {
            println!(
                "{}",
                format!("✅ Allocated {allocated} children across {} parents", reports.len())
                    .success()
            );
        } else {
            println!(
                "{}",
                format!("⚠️  Allocated {allocated} children, {failures} failed").warning()
            );
            std::process::exit(2);
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Config {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Debug, clap::Parser)]
enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,

        /// Value to set
        value: String,
    },
}

impl Config {
    #[instrument]
    fn run(self, root: &std::path::Path) -> anyhow::Result<()> {
        let path = config_path(root);

        match self.command {
            ConfigCommand::Show => {
                let config = if path.exists() {
                    AllocationConfig::load(&path).map_err(|e| anyhow::anyhow!("{e}"))?
                } else {
                    AllocationConfig::default()
                };

                println!("Configuration:");
                println!("  default_mission_time: {}", config.default_mission_time());
                println!("  default_duty_cycle: {}", config.default_duty_cycle());
            }
            ConfigCommand::Set { key, value } => {
                let mut config = if path.exists() {
                    AllocationConfig::load(&path).map_err(|e| anyhow::anyhow!("{e}"))?
                } else {
                    AllocationConfig::default()
                };

                let parsed: f64 = value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Value must be a number"))?;

                match key.as_str() {
                    "default_mission_time" => config.set_default_mission_time(parsed),
                    "default_duty_cycle" => config.set_default_duty_cycle(parsed),
                    _ => {
                        return Err(anyhow::anyhow!(
                            "Unknown configuration key: '{key}'\nSupported keys: \
                             default_mission_time, default_duty_cycle",
                        ));
                    }
                }

                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                config.save(&path).map_err(|e| anyhow::anyhow!("{e}"))?;
                println!("{}", format!("Set {key} = {parsed}").success());
            }
        }

        Ok(())
    }
}

fn outcome_label(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Allocated => "allocated".success(),
        Outcome::Skipped => "skipped".dim(),
        Outcome::Failed(err) => format!("failed: {err}").warning(),
    }
}

fn print_report_table(report: &AllocationReport, tree: &AllocationTree) {
    println!(
        "Allocation of {} ({} method)",
        report.parent(),
        report.method()
    );
    println!(
        "{:<8} {:<28} {:>12} {:>14} {:>12}",
        "CHILD", "OUTCOME", "RELIABILITY", "HAZARD RATE", "MTBF"
    );
    println!("{}", "─".repeat(78).dim());

    for (id, outcome) in report.iter() {
        let node = tree.get(*id);
        let reliability = node
            .and_then(|n| n.reliability_alloc)
            .map_or_else(|| "–".to_string(), |v| format!("{v:.6}"));
        let hazard_rate = node
            .and_then(|n| n.hazard_rate_alloc)
            .map_or_else(|| "–".to_string(), |v| format!("{v:.4e}"));
        let mtbf = node
            .and_then(|n| n.mtbf_alloc)
            .map_or_else(|| "–".to_string(), |v| format!("{v:.2}"));

        println!(
            "{:<8} {:<28} {reliability:>12} {hazard_rate:>14} {mtbf:>12}",
            id.to_string(),
            outcome_label(outcome),
        );
    }
}

fn report_json(report: &AllocationReport, tree: &AllocationTree) -> serde_json::Value {
    use serde_json::json;

    let children: Vec<_> = report
        .iter()
        .map(|(id, outcome)| {
            let node = tree.get(*id);
            let status = match outcome {
                Outcome::Allocated => "allocated",
                Outcome::Skipped => "skipped",
                Outcome::Failed(_) => "failed",
            };
            json!({
                "id": id.to_string(),
                "status": status,
                "error": match outcome {
                    Outcome::Failed(err) => Some(err.to_string()),
                    _ => None,
                },
                "reliability_alloc": node.and_then(|n| n.reliability_alloc),
                "hazard_rate_alloc": node.and_then(|n| n.hazard_rate_alloc),
                "mtbf_alloc": node.and_then(|n| n.mtbf_alloc),
            })
        })
        .collect();

    json!({
        "parent": report.parent().to_string(),
        "method": report.method().to_string(),
        "children": children,
    })
}

fn print_report_json(
    report: &AllocationReport,
    tree: &AllocationTree,
) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&report_json(report, tree))?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use relalloc::GoalMeasure;
    use tempfile::tempdir;

    use super::*;

    fn add(root: &std::path::Path, id: u32, parent: Option<u32>, method: MethodArg) {
        let add = Add {
            id: HardwareId::new(id),
            parent: parent.map(HardwareId::new),
            method,
            mission_time: None,
            duty_cycle: None,
            hazard_rate: None,
            weight_factor: None,
            n_sub_systems: None,
            n_sub_elements: None,
            int_factor: None,
            soa_factor: None,
            op_time_factor: None,
            env_factor: None,
            excluded: false,
        };
        add.run(root.to_path_buf()).expect("add command should succeed");
    }

    #[test]
    fn add_run_creates_records_and_links_parents() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();

        add(root, 1, None, MethodArg::Equal);
        add(root, 2, Some(1), MethodArg::None);

        let worksheet = Worksheet::open(root.to_path_buf()).unwrap();
        assert_eq!(worksheet.tree().len(), 2);
        assert_eq!(
            worksheet.tree().get(HardwareId::new(2)).unwrap().parent_id,
            Some(HardwareId::new(1))
        );
        assert_eq!(
            worksheet.tree().get(HardwareId::new(1)).unwrap().method,
            Method::Equal
        );
    }

    #[test]
    fn goal_run_converts_the_entered_goal() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();

        add(root, 1, None, MethodArg::Equal);

        let goal = Goal {
            id: HardwareId::new(1),
            reliability: Some(0.95),
            hazard_rate: None,
            mtbf: None,
            mission_time: Some(100.0),
        };
        goal.run(root.to_path_buf()).expect("goal command should succeed");

        let worksheet = Worksheet::open(root.to_path_buf()).unwrap();
        let node = worksheet.tree().get(HardwareId::new(1)).unwrap();
        assert_eq!(node.goal_measure, GoalMeasure::Reliability);
        assert!((node.mtbf_goal - 1949.5726).abs() < 1e-2);
    }

    #[test]
    fn goal_run_requires_exactly_one_measure() {
        let tmp = tempdir().unwrap();
        add(tmp.path(), 1, None, MethodArg::None);

        let goal = Goal {
            id: HardwareId::new(1),
            reliability: Some(0.95),
            hazard_rate: Some(0.001),
            mtbf: None,
            mission_time: None,
        };
        assert!(goal.run(tmp.path().to_path_buf()).is_err());
    }

    #[test]
    fn allocate_run_writes_allocations_and_trickles_goals() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();

        add(root, 1, None, MethodArg::Equal);
        add(root, 2, Some(1), MethodArg::None);
        add(root, 3, Some(1), MethodArg::None);

        let goal = Goal {
            id: HardwareId::new(1),
            reliability: Some(0.81),
            hazard_rate: None,
            mtbf: None,
            mission_time: None,
        };
        goal.run(root.to_path_buf()).unwrap();

        let allocate = Allocate {
            parent: HardwareId::new(1),
            trickle: true,
            format: ReportFormat::Table,
            quiet: true,
        };
        allocate
            .run(root.to_path_buf())
            .expect("allocate command should succeed");

        let worksheet = Worksheet::open(root.to_path_buf()).unwrap();
        let child = worksheet.tree().get(HardwareId::new(2)).unwrap();
        assert!((child.reliability_alloc.unwrap() - 0.9).abs() < 1e-12);
        assert!((child.reliability_goal - 0.9).abs() < 1e-12);
        assert_eq!(child.method, Method::Equal);
    }

    #[test]
    fn cascade_run_allocates_every_level() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();

        add(root, 1, None, MethodArg::Equal);
        add(root, 2, Some(1), MethodArg::None);
        add(root, 3, Some(2), MethodArg::None);

        let goal = Goal {
            id: HardwareId::new(1),
            reliability: Some(0.9),
            hazard_rate: None,
            mtbf: None,
            mission_time: None,
        };
        goal.run(root.to_path_buf()).unwrap();

        let cascade = Cascade {
            root: None,
            format: ReportFormat::Table,
            quiet: true,
        };
        cascade
            .run(root.to_path_buf())
            .expect("cascade command should succeed");

        let worksheet = Worksheet::open(root.to_path_buf()).unwrap();
        let leaf = worksheet.tree().get(HardwareId::new(3)).unwrap();
        assert!((leaf.reliability_alloc.unwrap() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn remove_run_detaches_children() {
        let tmp = tempdir().unwrap();
        let root = tmp.path();

        add(root, 1, None, MethodArg::None);
        add(root, 2, Some(1), MethodArg::None);

        let remove = Remove {
            id: HardwareId::new(1),
            yes: true,
        };
        remove
            .run(root.to_path_buf())
            .expect("remove command should succeed");

        let worksheet = Worksheet::open(root.to_path_buf()).unwrap();
        assert!(!worksheet.tree().contains(HardwareId::new(1)));
        assert_eq!(
            worksheet.tree().get(HardwareId::new(2)).unwrap().parent_id,
            None
        );
    }
}
