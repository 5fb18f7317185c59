// Random-command rollouts of one task on Rapier, one JSON line per episode.

use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use r2d2_physics::PhysicsWorld;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

use r2d2_tasks::{logging, make_env, Command, RunConfig, TaskError, TaskKind};

#[derive(Parser, Debug)]
#[command(name = "rollout", about = "Run random-command episodes of an R2D2 task")]
struct Cli {
    /// Task id or name, e.g. `task_103` or `conveyor_delivery`.
    #[arg(long)]
    task: TaskKind,

    #[arg(long, default_value_t = 1)]
    episodes: u32,

    /// JSON file with `env` settings and `task` overrides.
    #[arg(long)]
    config: Option<String>,

    /// Overrides the configured seed. Episode `i` is reset with `seed + i`.
    #[arg(long)]
    seed: Option<u64>,

    /// Truncate episodes after this many control steps.
    #[arg(long)]
    max_steps: Option<u32>,

    #[arg(long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    /// Chance per step of asking for a jump.
    #[arg(long, default_value_t = 0.02)]
    jump_chance: f64,
}

/// A uniform random action in the flat layout a policy would emit.
fn random_command(rng: &mut StdRng, jump_chance: f64) -> Result<Command, TaskError> {
    let mut action = [0.0f32; Command::SIZE];
    for value in &mut action[..3] {
        *value = rng.random_range(-1.0..=1.0);
    }
    action[3] = if rng.random_bool(jump_chance) { 1.0 } else { 0.0 };
    Command::from_slice(&action)
}

fn run(cli: &Cli) -> Result<(), TaskError> {
    let run_config = match &cli.config {
        Some(path) => RunConfig::from_path(path)?,
        None => RunConfig::default(),
    };
    let mut env_config = run_config.env;
    if let Some(seed) = cli.seed {
        env_config.seed = seed;
    }
    if cli.max_steps.is_some() {
        env_config.max_episode_steps = cli.max_steps;
    }

    let sim = PhysicsWorld::new(&env_config.physics());
    let mut env = make_env(cli.task, Box::new(sim), env_config, run_config.task)?;
    let seed = env.config().seed;
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);

    for episode in 0..cli.episodes {
        env.reset(Some(seed.wrapping_add(u64::from(episode))))?;
        let mut episode_return = 0.0f64;
        loop {
            let command = random_command(&mut rng, cli.jump_chance.clamp(0.0, 1.0))?;
            let t = env.step(&command)?;
            episode_return += f64::from(t.reward);
            if t.done() {
                let line = json!({
                    "task": cli.task.id(),
                    "episode": episode,
                    "steps": t.info.steps,
                    "return": episode_return,
                    "success": t.info.success.unwrap_or(false),
                    "elapsed": t.info.elapsed,
                    "truncated": t.truncated,
                });
                println!("{line}");
                break;
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("rollout failed: {err}");
            ExitCode::FAILURE
        }
    }
}
