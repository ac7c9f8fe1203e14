// crates/sift-cli/src/cli.rs

use crate::error::Error;
use clap::{builder::ValueHint, Args, Parser, Subcommand, ValueEnum};
use sea_query::{PostgresQueryBuilder, SqliteQueryBuilder};
use serde_json::{json, Value as Json};
use sift::{
    parse, DefaultValueParser, MappingRegistry, MemoryCompiler, RelationalCompiler, Schema,
    Settings,
};
use std::{path::Path, path::PathBuf, process::ExitCode};
use tracing::{debug, error, info};

pub type Result<T> = std::result::Result<T, Error>;

#[tracing::instrument(skip_all)]
pub fn start() -> ExitCode {
    let cli = Cli::parse();

    run(cli).map_or_else(
        |e| {
            error!("sift failed: {}", e);
            ExitCode::FAILURE
        },
        |out| {
            println!("{out}");
            ExitCode::SUCCESS
        },
    )
}

/// Execute a parsed command line and return what it prints.
pub fn run(cli: Cli) -> Result<String> {
    match cli.command {
        Commands::Parse(cmd) => do_parse(cmd),
        Commands::Sql(cmd) => do_sql(cmd),
        Commands::Select(cmd) => do_select(cmd),
    }
}

fn do_parse(cmd: ParseCmd) -> Result<String> {
    let query = parse(&cmd.query)?;
    Ok(serde_json::to_string_pretty(&query)?)
}

fn do_sql(cmd: SqlCmd) -> Result<String> {
    let ctx = Context::load(&cmd.target)?;
    let query = parse(&cmd.query)?;

    let compiled = RelationalCompiler::new(
        &ctx.schema,
        &ctx.registry,
        &DefaultValueParser,
        ctx.settings,
    )
    .compile(&query)?;

    let select = compiled.to_select();
    let sql = match cmd.dialect {
        Dialect::Postgres => select.to_string(PostgresQueryBuilder),
        Dialect::Sqlite => select.to_string(SqliteQueryBuilder),
    };
    info!(joins = compiled.joins().len(), "query compiled");

    Ok(serde_json::to_string_pretty(&json!({
        "sql": sql,
        "includes": compiled.includes(),
        "page": compiled.page(),
    }))?)
}

fn do_select(cmd: SelectCmd) -> Result<String> {
    let ctx = Context::load(&cmd.target)?;
    let query = parse(&cmd.query)?;

    let data: Json = serde_json::from_str(&read(&cmd.data)?)?;
    let records = data.as_array().ok_or(Error::NotAnArray)?;
    debug!(records = records.len(), "data loaded");

    let page = MemoryCompiler::new(&ctx.schema, &ctx.registry, ctx.settings)?
        .execute(&query, records)?;
    info!(selected = page.len(), "query evaluated");

    Ok(serde_json::to_string_pretty(&page)?)
}

/// Schema, registry and settings for one root resource type.
struct Context {
    schema: Schema,
    registry: MappingRegistry,
    settings: Settings,
}

impl Context {
    fn load(target: &Target) -> Result<Self> {
        let schema = Schema::from_toml_str(&read(&target.schema)?)?;
        let registry = MappingRegistry::build(&schema, &target.root)?;
        let settings = match &target.settings {
            Some(path) => Settings::from_toml_str(&read(path)?)?,
            None => Settings::default(),
        };
        debug!(root = %target.root, ?settings, "context loaded");
        Ok(Self {
            schema,
            registry,
            settings,
        })
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Parser, Debug)]
#[command(name = "sift", version, about = "Query filter language tool")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a query string and print its structure as JSON
    Parse(ParseCmd),
    /// Compile a query string into SQL for a resource type
    Sql(SqlCmd),
    /// Evaluate a query string over a JSON array of records
    Select(SelectCmd),
}

#[derive(Args, Debug)]
pub struct ParseCmd {
    /// Query string, e.g. `filter[name]=a,b&sort=-name`
    #[arg(value_name = "QUERY")]
    pub query: String,
}

#[derive(Args, Debug)]
pub struct Target {
    /// Schema file (TOML, `[[entity]]` tables)
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, value_parser = file_must_exist)]
    pub schema: PathBuf,

    /// Root resource type
    #[arg(long, value_name = "TYPE")]
    pub root: String,

    /// Settings file (or set SIFT_SETTINGS)
    #[arg(long, value_name = "FILE", env = "SIFT_SETTINGS", value_hint = ValueHint::FilePath, value_parser = file_must_exist)]
    pub settings: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SqlCmd {
    #[command(flatten)]
    pub target: Target,

    #[arg(long, value_enum, default_value_t = Dialect::Postgres)]
    pub dialect: Dialect,

    #[arg(value_name = "QUERY")]
    pub query: String,
}

#[derive(Args, Debug)]
pub struct SelectCmd {
    #[command(flatten)]
    pub target: Target,

    /// JSON file holding an array of records
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, value_parser = file_must_exist)]
    pub data: PathBuf,

    #[arg(value_name = "QUERY")]
    pub query: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

fn file_must_exist(s: &str) -> std::result::Result<PathBuf, String> {
    let p = PathBuf::from(s);
    if !p.exists() {
        return Err(format!("Not found: {}", p.display()));
    }
    if !p.is_file() {
        return Err(format!("Not a file: {}", p.display()));
    }
    Ok(p)
}
