//! Drives the environment with random actions and reports the return of each episode.

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use std::path::PathBuf;
use traffic_gym::{EnvConfig, RenderMode, TrafficEnv};

#[derive(Parser, Debug)]
#[command(about = "Runs random-action episodes in the SUMO traffic environment")]
struct Args {
    /// JSON environment configuration; defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The number of episodes to run.
    #[arg(short, long, default_value_t = 10)]
    episodes: usize,
    /// Seed for the first reset and for action sampling.
    #[arg(short, long)]
    seed: Option<u64>,
    /// Run the simulator with its graphical interface.
    #[arg(long)]
    gui: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EnvConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EnvConfig::default(),
    };
    if args.gui {
        config.render_mode = Some(RenderMode::Human);
    }

    let mut env = TrafficEnv::sumo(config)?;
    let action_space = env.action_space();
    let vehicle = env.config().vehicle;
    let mut rng = match args.seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };

    for episode in 0..args.episodes {
        let seed = if episode == 0 { args.seed } else { None };
        env.reset(seed, None)?;

        let mut total_reward = 0.0;
        let mut steps = 0;
        loop {
            // Sampling happens in f32, so guard against rounding past the bounds
            let action = (action_space.sample(&mut rng)[0] as f64)
                .clamp(vehicle.max_dec, vehicle.max_acc);
            let step = env.step(action)?;
            total_reward += step.reward;
            steps += 1;
            if step.done() {
                break;
            }
        }
        println!(
            "Episode: {}. Steps: {}. Reward: {:.2}",
            episode, steps, total_reward
        );
    }

    env.close()?;
    Ok(())
}
