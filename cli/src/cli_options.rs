use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Feature,
    Label,
}

/// A `name:variant` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameVariant {
    pub name: String,
    pub variant: String,
}

fn parse_name_variant(value: &str) -> Result<NameVariant, String> {
    match value.split_once(':') {
        Some((name, variant)) if !name.is_empty() && !variant.is_empty() => Ok(NameVariant {
            name: name.to_string(),
            variant: variant.to_string(),
        }),
        _ => Err(format!("expected <name>:<variant>, got '{}'", value)),
    }
}

#[derive(Args, Debug)]
pub struct ResourceArgs {
    /// Resource name
    #[arg(short = 'n', long = "name")]
    pub name: String,
    /// Resource variant
    #[arg(short = 'v', long = "variant", default_value = "default")]
    pub variant: String,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Create an empty feature or label table
    CreateResource {
        #[command(flatten)]
        resource: ResourceArgs,
        #[arg(value_enum, short = 't', long = "type")]
        kind: ResourceKind,
    },
    /// Write (or overwrite) one entity value at a timestamp
    Write {
        #[command(flatten)]
        resource: ResourceArgs,
        #[arg(value_enum, short = 't', long = "type")]
        kind: ResourceKind,
        #[arg(short = 'e', long = "entity")]
        entity: String,
        /// Value text, parsed according to --value-type
        #[arg(long = "value")]
        value: String,
        /// One of int, int8, int16, int32, int64, float32, float64, string, bool
        #[arg(long = "value-type", default_value = "string")]
        value_type: String,
        /// RFC 3339 timestamp, defaults to now
        #[arg(long = "ts")]
        ts: Option<String>,
    },
    /// Snapshot the latest value per entity of a feature
    Materialize {
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// Print rows of a materialization as JSON lines
    ReadMaterialization {
        /// Materialization id (the feature name)
        #[arg(long = "id")]
        id: String,
        /// Exclusive start position, defaults to the first row
        #[arg(long = "start", default_value_t = 0)]
        start: i64,
        /// Inclusive end position, defaults to the last row
        #[arg(long = "end")]
        end: Option<i64>,
    },
    /// Join a label against features into a point-in-time correct table
    CreateTrainingSet {
        #[command(flatten)]
        resource: ResourceArgs,
        /// Label as <name>:<variant>
        #[arg(short = 'l', long = "label", value_parser = parse_name_variant)]
        label: NameVariant,
        /// Feature as <name>:<variant>; repeat to add more, order is kept
        #[arg(short = 'f', long = "feature", value_parser = parse_name_variant, required = true)]
        features: Vec<NameVariant>,
    },
    /// Print training set rows as JSON lines
    ReadTrainingSet {
        #[command(flatten)]
        resource: ResourceArgs,
    },
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliOptions {
    /// Path to the offline store YAML configuration.
    /// Can also be set via the OFFLINE_STORE_CONFIG_PATH environment variable.
    #[arg(short = 'c', long = "config", default_value = None)]
    pub config: Option<String>,
    /// The logging level. Case-insensitive.
    #[arg(
        value_enum,
        long = "log-level",
        ignore_case = true,
        default_value = "info"
    )]
    pub log_level: LogLevel,
    #[command(subcommand)]
    pub command: CliCommand,
}
