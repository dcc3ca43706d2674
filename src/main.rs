use local_web_agent::{AgentConfig, AgentPipeline};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = AgentConfig::from_env();
    let pipeline = match AgentPipeline::from_config(&config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(2);
        }
    };

    println!("🤖 Local Web Agent Started!");
    println!("--------------------------------------------------");
    println!("Type a request, e.g. 'search iPhone 15 on Taobao'. 'quit' to exit.");
    println!("--------------------------------------------------");

    let stdin = io::stdin();
    let mut reader = io::BufReader::new(stdin);
    let mut buffer = String::new();

    print!("> ");
    let _ = io::stdout().flush().await;

    while reader.read_line(&mut buffer).await? > 0 {
        let input = buffer.trim().to_string();
        buffer.clear();

        match input.as_str() {
            "" => {}
            "quit" | "exit" => break,
            query => {
                let response = pipeline.handle(query).await;
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }

        print!("> ");
        let _ = io::stdout().flush().await;
    }

    Ok(())
}
