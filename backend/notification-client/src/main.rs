use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use notification_client::models::{Audience, BroadcastRequest, SendNotificationRequest};
use notification_client::{
    logging, Config, ConnectionState, HttpNotificationsApi, NotificationHub, NotificationsApi,
    Session,
};

#[derive(Parser)]
#[command(name = "notification-client", version, about = "Notification inbox client for the approvals portal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the unread badge live until Ctrl-C (default)
    Watch,
    /// Print the authoritative unread count
    Count,
    /// List cached notifications, newest first
    List,
    /// Mark one notification as read
    MarkRead { id: String },
    /// Mark every notification as read
    MarkAllRead,
    /// Broadcast to every student or staff member
    Broadcast {
        #[arg(long, value_enum)]
        audience: AudienceArg,
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
    },
    /// Send to explicit recipients
    Send {
        #[arg(long = "recipient", required = true)]
        recipients: Vec<String>,
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum AudienceArg {
    Students,
    Staff,
}

impl From<AudienceArg> for Audience {
    fn from(arg: AudienceArg) -> Self {
        match arg {
            AudienceArg::Students => Audience::Students,
            AudienceArg::Staff => Audience::Staff,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;

    run(&config, cli.command.unwrap_or(Command::Watch)).await
}

async fn watch(config: &Config) -> anyhow::Result<()> {
    let hub = NotificationHub::from_config(config);
    hub.start().await.context("starting notification hub")?;

    let mut unread = hub.subscribe_unread();
    let mut connection = hub.subscribe_connection();
    let mut validity = hub.session().subscribe_validity();
    let mut inbox = hub.subscribe_notifications();
    let mut newest = hub.notifications().first().map(|n| n.id.clone());

    tracing::info!("Unread notifications: {}", badge(*unread.borrow_and_update()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            Ok(()) = unread.changed() => {
                tracing::info!("Unread notifications: {}", badge(*unread.borrow_and_update()));
            }
            Ok(()) = inbox.changed() => {
                let head = inbox.borrow_and_update().first().cloned();
                if let Some(n) = head {
                    if newest.as_deref() != Some(n.id.as_str()) {
                        tracing::info!("New notification: {}", n.title);
                        newest = Some(n.id);
                    }
                }
            }
            Ok(()) = connection.changed() => {
                let state = *connection.borrow_and_update();
                if state == ConnectionState::TornDown {
                    break;
                }
            }
            Ok(()) = validity.changed() => {
                if !*validity.borrow_and_update() {
                    tracing::error!("Session expired, log in again to keep receiving notifications");
                    break;
                }
            }
        }
    }

    hub.shutdown().await;
    Ok(())
}

/// Load the inbox (capped at `INBOX_CAPACITY`) and print it, newest first
async fn list(config: &Config) -> anyhow::Result<()> {
    let hub = NotificationHub::from_config(config);
    hub.reload_inbox().await.context("loading notifications")?;

    for n in hub.notifications() {
        let marker = if n.read { " " } else { "*" };
        let sender = n.sender_name.as_deref().unwrap_or("system");
        let when = n
            .created_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{} {:<12} {:<16} {} ({}): {}", marker, n.id, when, n.title, sender, n.message);
    }
    Ok(())
}

async fn run(config: &Config, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Watch => return watch(config).await,
        Command::List => return list(config).await,
        _ => {}
    }

    let session = Session::new(
        config.auth.access_token.clone(),
        config.auth.refresh_token.clone(),
    );
    let api = HttpNotificationsApi::new(&config.api.base_url, session);

    match command {
        Command::Count => {
            println!("{}", api.unread_count().await?);
        }
        Command::MarkRead { id } => {
            api.mark_read(&id).await?;
            println!("Marked {} as read", id);
        }
        Command::MarkAllRead => {
            api.mark_all_read().await?;
            println!("All notifications marked as read");
        }
        Command::Broadcast {
            audience,
            title,
            message,
        } => {
            api.broadcast(audience.into(), &BroadcastRequest { title, message })
                .await?;
            println!("Broadcast sent");
        }
        Command::Send {
            recipients,
            title,
            message,
        } => {
            api.send_custom(&SendNotificationRequest {
                recipients,
                title,
                message,
            })
            .await?;
            println!("Notification sent");
        }
        Command::Watch | Command::List => {}
    }

    Ok(())
}

fn badge(count: u64) -> String {
    if count > 9 {
        "9+".to_string()
    } else {
        count.to_string()
    }
}
