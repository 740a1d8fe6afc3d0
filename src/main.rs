// Copyright 2024 The DocAssert Authors
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use replay_path::{
    ignore_path, resolve, sort_key_candidates, ComparisonClient, DiffLocation, ExclusionRule,
    IgnoreRulePath, IgnoreType, IndexPath, PreciseIgnore, RuleScope, SortRule,
};

#[doc(hidden)]
#[macro_export]
macro_rules! handle_error {
    ($code:expr, $msg:expr, $($arg:tt)*) => {
        eprintln!($msg, $($arg)*);
        std::process::exit($code);
    };

    ($code:expr, $msg:expr) => {
        eprintln!($msg);
        std::process::exit($code);
    };
}

#[doc(hidden)]
struct Code;

impl Code {
    const SUCCESS: i32 = 0;
    const INTERNAL_ERROR: i32 = 1;
    const INVALID_ARGUMENT: i32 = 2;
    const UNRESOLVED_PATH: i32 = 3;
    const RULE_ERROR: i32 = 4;
    const SUBMISSION_ERROR: i32 = 5;
}

#[doc(hidden)]
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[doc(hidden)]
#[derive(Debug, Subcommand)]
enum Command {
    /// Print the value at a path
    Resolve {
        /// JSON document
        document: PathBuf,
        /// Slash separated path
        path: String,
        /// Match object keys case sensitively
        #[clap(long)]
        case_sensitive: bool,
    },
    /// Strip array indexes from a clicked path
    Filter { document: PathBuf, path: String },
    /// Build a precise ignore path anchored on a reference field
    Precise {
        document: PathBuf,
        path: String,
        /// Reference field, relative to the enclosing array element
        #[clap(short, long)]
        reference: Option<String>,
    },
    /// Print the title and ignore path of a diff location
    Title {
        /// Diff location as returned by the backend
        location: PathBuf,
    },
    /// List the fields a list can be sorted by
    SortKeys { document: PathBuf, list_path: String },
    /// Submit an ignore rule
    Ignore {
        #[command(flatten)]
        backend: Backend,
        document: PathBuf,
        path: String,
        /// Build a precise ignore anchored on this reference field
        #[clap(short, long)]
        reference: Option<String>,
        #[clap(long, value_enum, default_value_t = Scope::Interface)]
        scope: Scope,
        /// Lifetime of a temporary rule, in days
        #[clap(long, default_value_t = 7)]
        ttl_days: u64,
    },
    /// Submit a list sort rule
    Sort {
        #[command(flatten)]
        backend: Backend,
        document: PathBuf,
        path: String,
        /// Key field to sort by, may be repeated
        #[clap(short = 'k', long = "key")]
        keys: Vec<String>,
    },
}

#[doc(hidden)]
#[derive(Debug, Args)]
struct Backend {
    /// Base URL of the comparison backend
    #[clap(short, long, env = "REPLAY_PATH_URL")]
    url: String,
    #[clap(long)]
    app_id: String,
    #[clap(long)]
    operation_id: Option<String>,
}

impl Backend {
    fn scope(&self) -> RuleScope {
        RuleScope::new(&self.app_id, self.operation_id.as_deref())
    }
}

#[doc(hidden)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Scope {
    Global,
    Interface,
    Temporary,
}

impl From<Scope> for IgnoreType {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Global => IgnoreType::Global,
            Scope::Interface => IgnoreType::Interface,
            Scope::Temporary => IgnoreType::Temporary,
        }
    }
}

fn load_json(path: &Path) -> Value {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            handle_error!(Code::INVALID_ARGUMENT, "Error reading {}: {}", path.display(), e);
        }
    };

    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            handle_error!(Code::INVALID_ARGUMENT, "Error parsing {}: {}", path.display(), e);
        }
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            handle_error!(Code::INTERNAL_ERROR, "Error: {}", e);
        }
    }
}

fn build_ignore_path(document: &Value, clicked: &IndexPath, reference: Option<&str>) -> IgnoreRulePath {
    let Some(reference) = reference else {
        let Some(path) = ignore_path(clicked, document) else {
            handle_error!(Code::UNRESOLVED_PATH, "Error: path {} cannot be resolved", clicked);
        };
        return path;
    };

    let mut session = match PreciseIgnore::open(clicked, document) {
        Ok(session) => session,
        Err(e) => {
            handle_error!(Code::RULE_ERROR, "Error: {}", e);
        }
    };
    debug!(element = %session.element(), "array element");

    if let Err(e) = session.select_reference(reference) {
        handle_error!(Code::RULE_ERROR, "Error: {}", e);
    }

    match session.build() {
        Ok(path) => path,
        Err(e) => {
            handle_error!(Code::RULE_ERROR, "Error: {}", e);
        }
    }
}

#[doc(hidden)]
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Resolve {
            document,
            path,
            case_sensitive,
        } => {
            let document = load_json(&document);
            match resolve(&IndexPath::from(path.as_str()), &document, case_sensitive) {
                Some(value) => print_json(value),
                None => {
                    handle_error!(Code::UNRESOLVED_PATH, "Error: path {} cannot be resolved", path);
                }
            }
        }
        Command::Filter { document, path } => {
            let document = load_json(&document);
            let clicked = IndexPath::from(path.as_str());
            println!("{}", build_ignore_path(&document, &clicked, None));
        }
        Command::Precise {
            document,
            path,
            reference,
        } => {
            let document = load_json(&document);
            let clicked = IndexPath::from(path.as_str());
            let Some(reference) = reference else {
                handle_error!(Code::RULE_ERROR, "Error: {}", replay_path::RuleError::NoReferenceSelected);
            };
            println!("{}", build_ignore_path(&document, &clicked, Some(&reference)));
        }
        Command::Title { location } => {
            let location: DiffLocation = match serde_json::from_value(load_json(&location)) {
                Ok(location) => location,
                Err(e) => {
                    handle_error!(Code::INVALID_ARGUMENT, "Error: invalid diff location: {}", e);
                }
            };
            println!("{}", location.title());
            println!("{}", location.ignore_path());
        }
        Command::SortKeys {
            document,
            list_path,
        } => {
            let document = load_json(&document);
            let Some(keys) = sort_key_candidates(&IndexPath::from(list_path.as_str()), &document)
            else {
                handle_error!(Code::UNRESOLVED_PATH, "Error: {} is not a list", list_path);
            };
            for key in keys {
                println!("{}", key);
            }
        }
        Command::Ignore {
            backend,
            document,
            path,
            reference,
            scope,
            ttl_days,
        } => {
            let Some(ttl) = ttl_days.checked_mul(24 * 60 * 60) else {
                handle_error!(Code::INVALID_ARGUMENT, "Error: --ttl-days {} is too large", ttl_days);
            };
            let document = load_json(&document);
            let clicked = IndexPath::from(path.as_str());
            let exclusions = build_ignore_path(&document, &clicked, reference.as_deref());
            let rule = ExclusionRule::new(
                backend.scope(),
                exclusions,
                scope.into(),
                Duration::from_secs(ttl),
            );

            if let Err(e) = ComparisonClient::new(&backend.url).insert_ignore_node(&rule).await {
                handle_error!(Code::SUBMISSION_ERROR, "Error: {}", e);
            }
            println!("{}", rule.exclusions);
        }
        Command::Sort {
            backend,
            document,
            path,
            keys,
        } => {
            let document = load_json(&document);
            let Some(mut rule) = SortRule::from_clicked(&IndexPath::from(path.as_str()), &document)
            else {
                handle_error!(Code::UNRESOLVED_PATH, "Error: path {} cannot be resolved", path);
            };
            for key in keys {
                rule = rule.with_key(key.as_str());
            }

            let client = ComparisonClient::new(&backend.url);
            if let Err(e) = client.insert_sort_node(&backend.scope(), &rule).await {
                handle_error!(Code::SUBMISSION_ERROR, "Error: {}", e);
            }
            println!("{}", rule.display_path());
        }
    }

    std::process::exit(Code::SUCCESS);
}
