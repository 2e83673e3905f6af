use clap::{Parser, ValueEnum};
use foxfit_utils::sampler::Method;

/// Describe the urban fox table and fit groupsize ~ Normal(alpha * area, 1).
#[derive(Parser, Debug)]
#[command(name = "foxfit", version, about = "Fox group size vs territory area")]
pub struct Cli {
    #[arg(
        value_name = "FOXES",
        help = "File path to the ';'-separated fox table"
    )]
    pub foxes: String,

    #[arg(
        long,
        short,
        default_value = "foxfit",
        value_name = "OUT",
        help = "Output directory, must not exist"
    )]
    pub out: String,

    #[arg(long, default_value = "2000", help = "Posterior draws kept per chain")]
    pub draws: usize,

    #[arg(long, default_value = "1000", help = "Warm-up iterations per chain")]
    pub tune: usize,

    #[arg(long, default_value = "2", help = "Number of chains")]
    pub chains: usize,

    #[arg(long, help = "Seed for reproducible sampling")]
    pub seed: Option<u64>,

    #[arg(
        value_enum,
        long,
        default_value = "hmc",
        value_name = "METHOD",
        help = "MCMC sampler"
    )]
    pub method: SamplerMethod,

    #[arg(
        value_enum,
        long,
        default_value = "normal",
        value_name = "VERBOSITY",
        help = "Verbosity level"
    )]
    pub verbosity: LogLevel,
}

#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMethod {
    Hmc,
    Metropolis,
}

impl From<SamplerMethod> for Method {
    fn from(method: SamplerMethod) -> Self {
        match method {
            SamplerMethod::Hmc => Method::Hmc,
            SamplerMethod::Metropolis => Method::Metropolis,
        }
    }
}

#[derive(Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Verbose,
    Normal,
    Silent,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Verbose => write!(f, "verbose"),
            LogLevel::Normal => write!(f, "normal"),
            LogLevel::Silent => write!(f, "silent"),
        }
    }
}
