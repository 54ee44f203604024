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

//! Appends random translation delivery events to a file, to feed a
//! `minutely --keep-live` run.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use minutely_analytics::event::Event;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{path::PathBuf, time::Duration};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, Level};

const LANGUAGES: &[&str] = &["en", "fr", "de", "es", "it", "pt"];
const CLIENTS: &[&str] = &["airliberty", "taxi-eats", "booking", "easyjet"];

/// Generate random translation delivery events
#[derive(Debug, Parser)]
#[command(name = "minutely-generator", version, about)]
struct Args {
    /// File the events are appended to, created when missing
    #[arg(long, alias = "output_file")]
    output_file: PathBuf,

    /// Max delay in seconds between two events
    #[arg(long, alias = "max_delay", default_value_t = 5)]
    max_delay: u64,

    /// Seed for reproducible events
    #[arg(long)]
    seed: Option<u64>,
}

fn random_event(rng: &mut StdRng) -> Event {
    let source = rng.random_range(0..LANGUAGES.len());
    // Any language but the source one
    let target = (source + rng.random_range(1..LANGUAGES.len())) % LANGUAGES.len();
    Event {
        timestamp: Utc::now(),
        translation_id: format!("{:016x}{:04x}", rng.random::<u64>(), rng.random::<u16>()),
        source_language: LANGUAGES[source].to_string(),
        target_language: LANGUAGES[target].to_string(),
        client_name: CLIENTS[rng.random_range(0..CLIENTS.len())].to_string(),
        event_name: "translation_delivered".to_string(),
        nr_words: rng.random_range(1..=200),
        duration: f64::from(rng.random_range(1..=100_u32)),
    }
}

async fn append_event(path: &PathBuf, event: &Event) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    file.write_all(&line)
        .await
        .with_context(|| format!("writing to {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

async fn generate(args: Args) -> anyhow::Result<u64> {
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut generated = 0;
    loop {
        let event = random_event(&mut rng);
        append_event(&args.output_file, &event).await?;
        generated += 1;
        debug!(
            "Generated event {} with duration {}",
            event.translation_id, event.duration
        );

        let delay = Duration::from_secs(rng.random_range(0..=args.max_delay));
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(generated),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!(
        "Appending events to {:?} every 0 to {} seconds, Ctrl-C to stop",
        args.output_file, args.max_delay
    );
    let generated = generate(args).await?;
    info!("Generated {generated} events");
    Ok(())
}
