use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::Path;

use domino_connector::parser::filter_parser::parse_filter;
use domino_connector::{
    logging, AttributeFilter, AttributeSet, ConnectorConfig, ConnectorError, DominoConnector, ObjectClass,
    UpdateKind,
};

#[derive(Parser, Debug)]
#[command(name = "domino-connector")]
#[command(about = "Provision accounts and groups in a hierarchical-name directory")]
struct Args {
    /// Configuration file path (default: config.yaml)
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (overrides config file)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and reach the directory
    Test,
    /// Print the attribute registry
    Schema,
    /// Print the selection formula a filter compiles to
    Compile {
        object_class: ObjectClass,
        filter: String,
    },
    Search {
        object_class: ObjectClass,
        /// Filter such as `LastName eq "Doe"`; all objects when omitted
        filter: Option<String>,
        /// Comma-separated attributes to return
        #[arg(long)]
        attributes: Option<String>,
        /// Comma-separated attributes to leave out of the defaults
        #[arg(long)]
        excluded_attributes: Option<String>,
        /// Stop after this many objects
        #[arg(long)]
        limit: Option<usize>,
    },
    Get {
        object_class: ObjectClass,
        uid: String,
        #[arg(long)]
        attributes: Option<String>,
    },
    /// Create an object from a JSON attribute map
    Create {
        object_class: ObjectClass,
        attributes: String,
    },
    /// Update an object from a JSON attribute map
    Update {
        object_class: ObjectClass,
        uid: String,
        attributes: String,
        /// add, remove or replace
        #[arg(long, default_value = "replace")]
        kind: UpdateKind,
    },
    Delete {
        object_class: ObjectClass,
        uid: String,
    },
}

fn load_config(path: &str) -> Result<ConnectorConfig, Box<dyn std::error::Error>> {
    if path == "config.yaml" && !Path::new(path).exists() {
        eprintln!("No config.yaml found, using an in-memory directory");
        return Ok(ConnectorConfig::default_config());
    }
    ConnectorConfig::load_from_file(path)
        .map_err(|e| format!("Failed to load configuration: {}", e).into())
}

fn attribute_set(json: &str) -> Result<AttributeSet, Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(json)?;
    Ok(AttributeSet::from_json(&value)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let result = run(Args::parse()).await;
    if let Err(e) = &result {
        if e
            .downcast_ref::<ConnectorError>()
            .is_some_and(ConnectorError::is_transient)
        {
            eprintln!("The directory could not be reached; the operation can be retried");
        }
    }
    result
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args.config)?;
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init(level)?;

    let connector = DominoConnector::from_config(config)?;

    match args.command {
        Command::Test => {
            connector.test().await?;
            println!("Connection OK");
        }
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&connector.schema())?);
        }
        Command::Compile {
            object_class,
            filter,
        } => {
            let filter = parse_filter(&filter)?;
            match connector.compile_filter(&filter, object_class)? {
                Some(formula) => println!("{}", formula),
                None => println!("(no constraint)"),
            }
        }
        Command::Search {
            object_class,
            filter,
            attributes,
            excluded_attributes,
            limit,
        } => {
            let filter = filter.as_deref().map(parse_filter).transpose()?;
            let attributes =
                AttributeFilter::from_params(attributes.as_deref(), excluded_attributes.as_deref())
                    .resolve(object_class);
            let mut objects = Vec::new();
            connector
                .search(object_class, filter.as_ref(), &attributes, |object| {
                    objects.push(object);
                    limit.map_or(true, |limit| objects.len() < limit)
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&objects)?);
        }
        Command::Get {
            object_class,
            uid,
            attributes,
        } => {
            let attributes =
                AttributeFilter::from_params(attributes.as_deref(), None).resolve(object_class);
            match connector.get(object_class, &uid, &attributes).await? {
                Some(object) => println!("{}", serde_json::to_string_pretty(&object)?),
                None => return Err(format!("{} {} not found", object_class, uid).into()),
            }
        }
        Command::Create {
            object_class,
            attributes,
        } => {
            let uid = connector
                .create(object_class, attribute_set(&attributes)?)
                .await?;
            println!("{}", uid);
        }
        Command::Update {
            object_class,
            uid,
            attributes,
            kind,
        } => {
            let uid = connector
                .update(object_class, &uid, attribute_set(&attributes)?, kind)
                .await?;
            println!("{}", uid);
        }
        Command::Delete { object_class, uid } => {
            connector.delete(object_class, &uid).await?;
            println!("Deleted {} {}", object_class, uid);
        }
    }

    connector.dispose().await;
    Ok(())
}
