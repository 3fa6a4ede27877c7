use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scalar_autograd::{fit, predict, Activation, Graph, Mlp, Module, TrainConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scalar-autograd", version, about = "Scalar reverse-mode autodiff playground")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Differentiate relu(a*b + a**2 - b/a) at a=2, b=3
    Demo,
    /// Train a small MLP on the XOR table
    Train {
        #[arg(long, default_value_t = 500)]
        epochs: usize,
        #[arg(long, default_value_t = 0.05)]
        learning_rate: f64,
        /// Hidden layer widths, comma separated
        #[arg(long, value_delimiter = ',', default_value = "8,8")]
        hidden: Vec<usize>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 50)]
        log_every: usize,
    },
}

fn run_demo() -> scalar_autograd::Result<()> {
    let mut g = Graph::new();
    let a = g.leaf(2.0);
    let b = g.leaf(3.0);

    let ab = g.mul(a, b);
    let a_sq = g.pow(a, 2)?;
    let b_over_a = g.div(b, a);
    let sum = g.add(ab, a_sq);
    let c = g.sub(sum, b_over_a);
    let d = g.relu(c);
    g.backward(d);

    println!("{}, {}", g.value(a), g.grad(a));
    println!("{}, {}", g.value(b), g.grad(b));
    println!("{}, {}", g.value(d), g.grad(d));
    Ok(())
}

fn run_train(config: TrainConfig) -> scalar_autograd::Result<()> {
    println!("=== Scalar MLP Training ===\n");
    config.validate()?;

    let inputs = vec![
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let targets = vec![-1.0, 1.0, 1.0, -1.0];

    let mut sizes = config.hidden_sizes.clone();
    sizes.push(1);
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut model = Mlp::new(2, &sizes, Activation::Tanh, &mut rng);
    println!(
        "Model: 2 -> {:?} -> 1 ({} parameters)",
        config.hidden_sizes,
        model.num_parameters()
    );
    println!("Training for {} epochs...\n", config.epochs);

    let losses = fit(&mut model, &inputs, &targets, &config)?;
    if let (Some(first), Some(last)) = (losses.first(), losses.last()) {
        println!("loss: {:.6} -> {:.6}\n", first, last);
    }

    for (row, target) in inputs.iter().zip(&targets) {
        let prediction = predict(&model, row)?;
        println!("{:?} -> {:+.4} (target {:+})", row, prediction, target);
    }

    println!("\n✓ Training complete!");
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Command::Demo => run_demo(),
        Command::Train {
            epochs,
            learning_rate,
            hidden,
            seed,
            log_every,
        } => run_train(TrainConfig {
            learning_rate,
            epochs,
            hidden_sizes: hidden,
            seed,
            log_every,
        }),
    };

    if let Err(err) = result {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
