mod auth;
mod cycle;
mod ecobee;
mod error;
mod observe;
mod settings;
mod store;
mod supervisor;
#[cfg(test)]
mod testing;
mod wait;
mod weather;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    supervisor::run().await
}
