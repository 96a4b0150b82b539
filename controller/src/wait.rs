use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

const SPINNER: [&str; 10] = [
    "( ●    )",
    "(  ●   )",
    "(   ●  )",
    "(    ● )",
    "(     ●)",
    "(    ● )",
    "(   ●  )",
    "(  ●   )",
    "( ●    )",
    "(●     )",
];

/// Sleeps for `total`, logging the remaining seconds every `tick` when `show`
/// is set. Returns `false` if `cancel` fired before the time was up.
pub async fn wait(
    total: Duration,
    tick: Duration,
    cancel: &CancellationToken,
    show: bool,
    message: &str,
) -> bool {
    let deadline = Instant::now() + total;
    let tick = if tick.is_zero() { total } else { tick };
    let mut frame = 0;

    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let remaining = deadline - now;
        if show {
            info!(
                "{}{:>5.0}{}",
                SPINNER[frame % SPINNER.len()],
                remaining.as_secs_f64(),
                message
            );
        }
        frame += 1;

        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(tick.min(remaining)) => {}
        }
    }
}
