use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use quizwave::config::{Config, LogFormat};
use quizwave::store::{FileQuizSource, JsonFileSink, SummaryQueue};
use quizwave::{api, QuizServer};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    // Logging starts first so config warnings are not lost
    init_tracing(LogFormat::from_env());
    let config = Config::from_env();

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        quiz_dir = %config.storage.quiz_dir,
        summary_dir = %config.storage.summary_dir,
        "Starting QuizWave session server"
    );

    let quizzes = Arc::new(FileQuizSource::new(&config.storage.quiz_dir));
    let summaries = SummaryQueue::new(
        Arc::new(JsonFileSink::new(&config.storage.summary_dir)),
        config.storage.summary_retry_count,
    );

    let server = Arc::new(QuizServer::new(quizzes, summaries, config.engine.clone()));
    server.clone().start_sweeper();

    warp::serve(api::routes(server))
        .run(config.bind_address())
        .await;
}
