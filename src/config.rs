use clap::Parser;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "photo-curator")]
#[command(about = "Picks the best photo from a batch using a vision model")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    // Rate limit max requests per window (per user)
    #[arg(long, env = "RATE_LIMIT_MAX_REQUESTS", default_value_t = 20)]
    pub rate_limit: usize,

    // Rate limit window in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 3600)]
    pub rate_window: u64,

    // Identity service (Supabase project url)
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: String,

    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    pub supabase_anon_key: String,

    // Missing key is reported per request, not at startup
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    #[arg(
        long,
        env = "GEMINI_BASE_URL",
        default_value = "https://generativelanguage.googleapis.com/v1beta"
    )]
    pub gemini_base_url: String,

    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    pub gemini_model: String,

    // Timeout for outbound calls in seconds
    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub upstream_timeout: u64,

    // Inbound body cap; 10 images of 5 MiB each after base64 inflation, plus slack
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 72 * 1024 * 1024)]
    pub max_body_bytes: usize,
}
