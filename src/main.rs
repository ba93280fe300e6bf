use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Result};
use rusqlite::Connection;

use school_roster::{
    count_students, import_spreadsheet, setup_database, template_csv, DuplicatePolicy,
    TEMPLATE_FILE_NAME,
};

fn db_path() -> String {
    env::var("ROSTER_DB").unwrap_or_else(|_| "school_roster.db".to_string())
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") => run_import(&args[2..]),
        Some("template") => run_template(args.get(2).map(String::as_str)),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("🏫 School Roster - bulk student import");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Usage:");
    println!("  school-roster import <file.csv|.xls|.xlsx> [--replace]");
    println!("  school-roster template [out.csv]");
    println!();
    println!("Database path comes from ROSTER_DB (default: school_roster.db)");
}

fn run_import(args: &[String]) -> Result<()> {
    let Some(file_arg) = args.first() else {
        bail!("import needs a file argument");
    };

    let replace = args.iter().any(|a| a == "--replace");
    let policy = DuplicatePolicy::from_replace_flag(replace);

    let path = Path::new(file_arg);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_arg);

    println!("📥 Importing roster: {}", file_name);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let bytes = fs::read(path)?;

    let conn = Connection::open(db_path())?;
    setup_database(&conn)?;

    let report = import_spreadsheet(&conn, file_name, &bytes, policy)?;

    println!("\n{}", report.message);
    println!("  Batch:   {} ({})", report.batch.id, report.batch.status.as_str());
    println!("  Rows:    {} total, {} valid, {} errors",
        report.stats.total_rows, report.stats.valid_rows, report.stats.error_rows);

    if !report.stats.errors.is_empty() {
        println!("\n⚠️  Errors:");
        for error in &report.stats.errors {
            println!("  - {}", error);
        }
    }

    let total = count_students(&conn)?;
    println!("\n✓ Database now holds {} students", total);

    if !report.success {
        std::process::exit(1);
    }

    Ok(())
}

fn run_template(out: Option<&str>) -> Result<()> {
    let out = out.unwrap_or(TEMPLATE_FILE_NAME);
    fs::write(out, template_csv())?;
    println!("✓ Template written to {}", out);
    Ok(())
}
