use mock_server::User;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn seed_users() -> Vec<User> {
    [
        (1, "Leanne Graham", "sincere@april.biz"),
        (2, "Ervin Howell", "shanna@melissa.tv"),
        (3, "Clementine Bauch", "nathan@yesenia.net"),
    ]
    .into_iter()
    .map(|(id, name, email)| User {
        id,
        name: name.to_string(),
        email: email.to_string(),
    })
    .collect()
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    mock_server::run_with_users(listener, seed_users()).await
}
