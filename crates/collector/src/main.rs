// Copyright (C) 2025-present The Minutely Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use minutely_analytics::metrics::MetricRegistry;
use minutely_collector::{
    config::{CollectorConfig, ConfigurationError},
    publishers::OutputConfig,
    Collection,
};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, Level};

/// Exit code for invalid command line arguments or configuration
const EXIT_CONFIG_ERROR: u8 = 2;

/// Per-minute delivery time metrics over a sliding window of translation
/// events.
///
/// Settings are read from the optional YAML config file, then from
/// `MINUTELY_` prefixed environment variables (`__` separates nested keys,
/// e.g. `MINUTELY_AGGREGATION__WINDOW_SIZE_MINUTES=10`), then from the
/// command line arguments.
#[derive(Debug, Parser)]
#[command(name = "minutely", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines file with one translation event per line
    #[arg(long, alias = "input_file")]
    input_file: Option<PathBuf>,

    /// Size of the sliding window in minutes
    #[arg(long, alias = "window_size")]
    window_size: Option<u32>,

    /// Metric computed over the window: moving_average (default) or maximum
    #[arg(long)]
    metric: Option<String>,

    /// Output file the results are appended to (default output.json), or
    /// `cli` to print them on the standard output
    #[arg(long)]
    output: Option<String>,

    /// Once the file is processed, keep monitoring it for new events
    #[arg(long, alias = "keep_live")]
    keep_live: bool,

    /// Logging level: trace, debug, info, warn or error
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<CollectorConfig, ConfigurationError> {
    let mut figment = Figment::new();
    if let Some(config_file) = &args.config {
        if !config_file.is_file() {
            return Err(ConfigurationError::Invalid(format!(
                "config file '{}' does not exist",
                config_file.display()
            )));
        }
        figment = figment.merge(Yaml::file(config_file));
    }
    figment = figment.merge(Env::prefixed("MINUTELY_").split("__"));

    if let Some(input_file) = &args.input_file {
        figment = figment.merge(Serialized::default("input.path", input_file));
    }
    if args.keep_live {
        figment = figment.merge(Serialized::default("input.follow", true));
    }
    if let Some(window_size) = args.window_size {
        figment = figment.merge(Serialized::default(
            "aggregation.window_size_minutes",
            window_size,
        ));
    }
    if let Some(metric) = &args.metric {
        figment = figment.merge(Serialized::default("aggregation.metric", metric));
    }
    if let Some(output) = &args.output {
        let output = match output.parse::<OutputConfig>() {
            Ok(output) => output,
            Err(never) => match never {},
        };
        figment = figment.merge(Serialized::default("output", output));
    }
    if let Some(level) = &args.log_level {
        figment = figment.merge(Serialized::default("logging.level", level));
    }

    figment
        .extract()
        .map_err(|err| ConfigurationError::Invalid(err.to_string()))
}

fn init_tracing(level: Level) -> anyhow::Result<()> {
    // Results may go to the standard output, keep the logs apart
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn run(config: CollectorConfig, registry: MetricRegistry) -> anyhow::Result<()> {
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    // If num threads is not configured then the default use all CPU cores is used
    if let Some(num_threads) = config.runtime.threads {
        runtime_builder.worker_threads(num_threads);
    }
    runtime_builder.enable_all();
    let runtime = runtime_builder.build()?;
    runtime.block_on(async move {
        let meter = opentelemetry::global::meter("minutely");
        let mut collection = Collection::start(&config, &registry, meter).await?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Termination signal received, flushing the current minute and shutting down");
                collection.shutdown().await;
            }
            ret = collection.wait() => {
                info!("Input fully processed, shutting down the collector");
                return ret;
            }
        }
        collection.wait().await
    })
}

fn main() -> ExitCode {
    let args = Args::parse();
    let registry = MetricRegistry::default();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Parsing configuration failed: {err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Err(err) = config.validate(&registry) {
        eprintln!("{err}");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }
    let level = match config.logging.level() {
        Ok(level) => level,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    if let Err(err) = init_tracing(level) {
        eprintln!("Setting up logging failed: {err}");
        return ExitCode::FAILURE;
    }

    match run(config, registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Collector terminated with an error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
