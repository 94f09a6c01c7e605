use anyhow::{bail, Result};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use photodup::config::Config;
use photodup::db::{Database, MemberRole, OverrideScope};
use photodup::escalation;
use photodup::grouping;
use photodup::logging;
use photodup::overrides::{self, Remedy};
use photodup::scanner::{ScanProgress, Scanner};

enum Command {
    Scan(PathBuf),
    Group,
    Escalate,
    Groups,
    Conflicts,
    Override { group_id: i64, file_path: String },
    ClearOverride { group_id: i64 },
    Resolve { group_id: i64, remedy: Remedy },
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("photodup {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown option: {}", other);
                print_help();
                std::process::exit(1);
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    let command = match positional.first().map(String::as_str) {
        Some("scan") => match positional.get(1) {
            Some(dir) => Command::Scan(PathBuf::from(dir)),
            None => usage_error("scan requires a directory argument"),
        },
        Some("group") => Command::Group,
        Some("escalate") => Command::Escalate,
        Some("groups") => Command::Groups,
        Some("conflicts") => Command::Conflicts,
        Some("override") => match (positional.get(1), positional.get(2)) {
            (Some(group), Some(file)) => match group.parse() {
                Ok(group_id) => Command::Override {
                    group_id,
                    file_path: file.clone(),
                },
                Err(_) => usage_error("override requires a numeric group id"),
            },
            _ => usage_error("override requires a group id and a file path"),
        },
        Some("clear-override") => match positional.get(1).map(|g| g.parse()) {
            Some(Ok(group_id)) => Command::ClearOverride { group_id },
            _ => usage_error("clear-override requires a numeric group id"),
        },
        Some("resolve") => match (
            positional.get(1).map(|g| g.parse()),
            positional.get(2).map(|r| Remedy::parse(r)),
        ) {
            (Some(Ok(group_id)), Some(Some(remedy))) => Command::Resolve { group_id, remedy },
            (Some(Ok(_)), _) => {
                usage_error("resolve requires a remedy: keep_manual or accept_automatic")
            }
            _ => usage_error("resolve requires a numeric group id and a remedy"),
        },
        Some(other) => usage_error(&format!("unknown command: {}", other)),
        None => usage_error("no command given"),
    };

    Args {
        config_path,
        command,
    }
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(1);
}

fn print_help() {
    println!(
        r#"photodup - duplicate and near-duplicate photo detection

USAGE:
    photodup [OPTIONS] <COMMAND>

COMMANDS:
    scan DIR                Scan a directory tree and fingerprint its images
    group                   Rebuild duplicate groups from stored fingerprints
    escalate                Promote duplicates with corroborating metadata
    groups                  List current duplicate groups
    conflicts               Show overrides that disagree with current state
    override GROUP FILE     Prefer FILE as the original of group GROUP
    clear-override GROUP    Remove the override and restore automatic choice
    resolve GROUP REMEDY    Apply keep_manual or accept_automatic to a conflict

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    PHOTODUP_LOG        Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/photodup/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    // journald on Linux, file fallback otherwise
    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match args.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)?;
    db.initialize()?;

    match args.command {
        Command::Scan(directory) => cmd_scan(&config, &db, &directory),
        Command::Group => cmd_group(&config, &db),
        Command::Escalate => cmd_escalate(&config, &db),
        Command::Groups => cmd_groups(&db),
        Command::Conflicts => cmd_conflicts(&db),
        Command::Override {
            group_id,
            file_path,
        } => cmd_override(&db, group_id, &file_path),
        Command::ClearOverride { group_id } => cmd_clear_override(&db, group_id),
        Command::Resolve { group_id, remedy } => cmd_resolve(&db, group_id, remedy),
    }
}

fn cmd_scan(config: &Config, db: &Database, directory: &PathBuf) -> Result<()> {
    if !directory.is_dir() {
        bail!("not a directory: {}", directory.display());
    }

    let scanner = Scanner::new(config.clone());
    let (tx, rx) = mpsc::channel();
    let cancel = Arc::new(AtomicBool::new(false));

    let progress = std::thread::spawn(move || {
        for event in rx {
            match event {
                ScanProgress::Started { total_files } => {
                    println!("Found {} images", total_files);
                }
                ScanProgress::Fingerprinting { current, total, path } => {
                    if current % 50 == 0 || current == total {
                        println!("  [{}/{}] {}", current, total, path);
                    }
                }
                ScanProgress::Completed { scanned, partial, failed } => {
                    println!(
                        "Fingerprinted {} files ({} partial, {} failed)",
                        scanned, partial, failed
                    );
                }
                ScanProgress::Error { message } => {
                    eprintln!("  warning: {}", message);
                }
            }
        }
    });

    let result = scanner.scan_directory(directory, db, Some(tx), cancel)?;
    let _ = progress.join();

    if result.marked_missing > 0 {
        println!("Marked {} previously tracked files as missing", result.marked_missing);
    }
    Ok(())
}

fn cmd_group(config: &Config, db: &Database) -> Result<()> {
    let outcome = grouping::run_grouping_pass(db, &config.grouping)?;
    println!(
        "{} files processed: {} exact groups, {} near groups, {} duplicates, {} conflicts ({}ms)",
        outcome.stats.files_processed,
        outcome.stats.exact_groups,
        outcome.stats.near_groups,
        outcome.stats.duplicates,
        outcome.stats.conflicts,
        outcome.stats.elapsed_ms
    );
    Ok(())
}

fn cmd_escalate(config: &Config, db: &Database) -> Result<()> {
    let stats = escalation::run_escalation_pass(db, &config.escalation)?;
    println!(
        "{} groups considered, {} duplicates marked safe ({}ms)",
        stats.groups_considered, stats.members_escalated, stats.elapsed_ms
    );
    Ok(())
}

fn cmd_groups(db: &Database) -> Result<()> {
    let groups = db.list_groups()?;
    if groups.is_empty() {
        println!("No duplicate groups. Run `photodup group` after scanning.");
        return Ok(());
    }

    for group in groups {
        println!(
            "group {} [{}] confidence {:.2}{}",
            group.id,
            group.tier.as_str(),
            group.confidence,
            group
                .distance
                .map(|d| format!(", distance {}", d))
                .unwrap_or_default()
        );
        for member in db.group_members(group.id)? {
            if let Some(file) = db.get_file(member.file_id)? {
                let marker = match member.role {
                    MemberRole::Original => "*",
                    MemberRole::Duplicate => " ",
                    MemberRole::SafeDuplicate => "safe",
                };
                println!("  {:>4} {}", marker, file.path);
            }
        }
    }
    Ok(())
}

fn cmd_conflicts(db: &Database) -> Result<()> {
    let conflicts = overrides::detect_conflicts(db)?;
    if conflicts.is_empty() {
        println!("No override conflicts.");
        return Ok(());
    }

    for conflict in conflicts {
        println!(
            "group {}: {} ({})",
            conflict.group_id,
            conflict.reason,
            conflict.kind.as_str()
        );
        println!("  remedies: {}", conflict.remedies.join(", "));
    }
    Ok(())
}

fn cmd_override(db: &Database, group_id: i64, file_path: &str) -> Result<()> {
    let Some(file) = db.get_file_by_path(file_path)? else {
        bail!("unknown file: {}", file_path);
    };
    let ov = overrides::record(
        db,
        group_id,
        file.id,
        OverrideScope::SingleGroup,
        "user_pick",
        None,
    )?;
    println!(
        "group {}: original is now {} (was file {})",
        group_id, file_path, ov.auto_id
    );
    Ok(())
}

fn cmd_resolve(db: &Database, group_id: i64, remedy: Remedy) -> Result<()> {
    let conflicts = overrides::detect_conflicts(db)?;
    let Some(conflict) = conflicts.iter().find(|c| c.group_id == group_id) else {
        bail!("no conflict detected for group {}", group_id);
    };
    overrides::apply_remedy(db, conflict, remedy)?;
    println!("group {}: {} applied", group_id, remedy.as_str());
    Ok(())
}

fn cmd_clear_override(db: &Database, group_id: i64) -> Result<()> {
    match overrides::remove(db, group_id)? {
        Some(_) => println!("group {}: override removed, automatic selection restored", group_id),
        None => println!("group {}: no active override", group_id),
    }
    Ok(())
}
