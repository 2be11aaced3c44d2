use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newscrew_console::api::FeedItem;
use newscrew_console::client::ApiClient;
use newscrew_console::config::Config;
use newscrew_console::navigation::{Navigator, Route};
use newscrew_console::pages::{
    AdminDashboardPage, ArticlesPage, LatestNewsPage, SettingsPage, SignInPage, SignUpPage,
};
use newscrew_console::session::Session;
use newscrew_console::storage::Database;
use newscrew_console::topics::Topic;
use newscrew_console::view::LoadState;

const NOT_LOGGED_IN: &str = "Not logged in. Run `newscrew login` first.";

#[derive(Parser)]
#[command(name = "newscrew", about = "NewsCrew newsletter console")]
struct Cli {
    /// Config file (defaults to $NEWSCREW_CONFIG or newscrew.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the backend address from the config file
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the session
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// End the session
    Logout,
    /// Email a password reset link
    ResetPassword {
        #[arg(long)]
        email: String,
    },
    /// Latest headline per topic, or every article of one topic
    News {
        #[arg(long)]
        topic: Option<String>,
    },
    /// Articles for your subscribed topic
    Articles,
    /// Show your profile
    Profile,
    /// Change your subscribed topic
    SetTopic { topic: String },
    /// Send the weekly newsletter, or one topic's newsletter
    SendNewsletter {
        #[arg(long)]
        topic: Option<String>,
    },
    /// Subscriber overview (admin)
    Dashboard,
    /// Print whether a session is stored
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newscrew_console=info,newscrew=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("NEWSCREW_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("newscrew.toml"));
    let mut config = Config::load(&config_path)?;
    if let Ok(url) = std::env::var("NEWSCREW_SESSION_DB") {
        config.session_db = url;
    }
    if let Some(base_url) = cli.base_url.clone() {
        config.base_url = base_url;
    }
    info!("Loaded configuration from {}", config_path.display());

    // Restore the session
    let db = Database::new(&config.session_db).await?;
    db.initialize().await?;
    let session = Arc::new(Session::open(Arc::new(db)).await?);

    let navigator = Arc::new(Navigator::new(Route::Home));
    let client = Arc::new(ApiClient::from_config(&config, session, navigator)?);

    run(cli.command, client, Arc::new(config)).await
}

async fn run(command: Command, client: Arc<ApiClient>, config: Arc<Config>) -> anyhow::Result<()> {
    match command {
        Command::Login { username, password } => {
            let mut page = SignInPage::new(client, config);
            match page.submit(&username, &password).await {
                Some(route) => println!("Logged in as {} (landing on {})", username, route),
                None => anyhow::bail!(page.error().unwrap_or(NOT_LOGGED_IN).to_string()),
            }
        }
        Command::Signup {
            username,
            email,
            password,
        } => {
            let mut page = SignUpPage::new(client, config);
            match page.submit(&username, &email, &password).await {
                Some(_) => println!("Account created for {}", username),
                None => anyhow::bail!(page.error().unwrap_or(NOT_LOGGED_IN).to_string()),
            }
        }
        Command::Logout => {
            if client.current_session().is_none() {
                println!("No active session");
            } else {
                client.logout().await;
                println!("Logged out");
            }
        }
        Command::ResetPassword { email } => {
            let mut page = SignInPage::new(client, config);
            let sent = page.send_reset_link(&email).await;
            let message = page.reset_message().unwrap_or_default().to_string();
            if !sent {
                anyhow::bail!(message);
            }
            println!("{}", message);
        }
        Command::News { topic: Some(topic) } => {
            let topic = topic.parse::<Topic>().map_err(anyhow::Error::msg)?;
            let feeds = client
                .latest_feeds(Some(topic.as_str()))
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            let items = feeds.get(topic.as_str()).cloned().unwrap_or_default();
            print_items(&items);
        }
        Command::News { topic: None } => {
            let page = LatestNewsPage::mount(client);
            page.load().await;
            match page.headlines() {
                LoadState::Loaded(items) => print_items(&items),
                LoadState::Failed(e) => anyhow::bail!("{}", e),
                _ => {}
            }
        }
        Command::Articles => {
            let page = ArticlesPage::mount(client).ok_or_else(|| anyhow::anyhow!(NOT_LOGGED_IN))?;
            page.load().await;
            if page.redirect_pending() {
                anyhow::bail!("Session expired. Run `newscrew login` again.");
            }
            if let Some(message) = page.error_message() {
                anyhow::bail!(message);
            }
            if let LoadState::Loaded(articles) = page.articles() {
                match articles.topic {
                    Some(topic) => {
                        println!("Subscribed to {}", topic);
                        print_items(&articles.items);
                    }
                    None => println!("No subscribed topic. Use `newscrew set-topic`."),
                }
            }
        }
        Command::Profile => {
            let profile = client.profile().await.map_err(|e| describe(&client, e))?;
            println!("{} <{}>", profile.username, profile.email);
            println!(
                "Subscribed topic: {}",
                profile.subscribed_topic.as_deref().unwrap_or("none")
            );
        }
        Command::SetTopic { topic } => {
            client
                .update_topic(&topic)
                .await
                .map_err(|e| describe(&client, e))?;
            let topic = topic.parse::<Topic>().map_err(anyhow::Error::msg)?;
            println!("Subscribed topic set to {}", topic);
        }
        Command::SendNewsletter { topic } => {
            let mut page =
                SettingsPage::mount(client.clone()).ok_or_else(|| anyhow::anyhow!(NOT_LOGGED_IN))?;
            let sent = match topic {
                Some(topic) => page.send_topic(&topic).await,
                None => page.send_weekly().await,
            };
            if page.redirect_pending() {
                anyhow::bail!("Session expired. Run `newscrew login` again.");
            }
            let status = page.status().unwrap_or_default().to_string();
            if sent.is_none() {
                anyhow::bail!(status);
            }
            println!("{}", status);
        }
        Command::Dashboard => {
            let page =
                AdminDashboardPage::mount(client).ok_or_else(|| anyhow::anyhow!(NOT_LOGGED_IN))?;
            page.load().await;
            if page.redirect_pending() {
                anyhow::bail!("Session expired. Run `newscrew login` again.");
            }
            match page.summary() {
                LoadState::Loaded(summary) => {
                    println!("Total subscriptions: {}", summary.total_subscriptions);
                    for user in &summary.all_users {
                        println!("  user  {:<20} {}", user.username, user.email);
                    }
                    for sub in &summary.all_subscriptions {
                        println!("  sub   {:<30} {}", sub.email, sub.topic);
                    }
                }
                LoadState::Failed(e) => anyhow::bail!("{}", e),
                _ => {}
            }
        }
        Command::Whoami => match client.current_session() {
            Some(_) => println!("Session active"),
            None => println!("{}", NOT_LOGGED_IN),
        },
    }

    Ok(())
}

fn describe(client: &ApiClient, err: newscrew_console::error::ApiError) -> anyhow::Error {
    if err.is_auth() || client.navigator().current() == Route::Login {
        return anyhow::anyhow!(NOT_LOGGED_IN);
    }
    anyhow::anyhow!(err.user_message("Request failed.").unwrap_or_default())
}

fn print_items(items: &[FeedItem]) {
    if items.is_empty() {
        println!("No articles");
        return;
    }
    for (i, item) in items.iter().enumerate() {
        let when = item
            .published_at()
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        if item.topic.is_empty() {
            println!("{:>3}. {} {}", i + 1, item.title, when);
        } else {
            println!("{:>3}. [{}] {} {}", i + 1, item.topic, item.title, when);
        }
        println!("     {}", item.link);
    }
}
