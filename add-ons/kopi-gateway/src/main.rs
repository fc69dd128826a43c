//! Axum-based HTTP gateway: entry point for the outlet chatbot.
//!
//! The gateway owns process lifecycle (`.env` loading, tracing, config,
//! collaborator client construction) and hands every chat turn to
//! `kopi_core::DialogueEngine`. The OpenRouter API key stays in this process;
//! clients never see or send it.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use kopi_core::{
    ActionDispatcher, ConversationLog, CoreConfig, DialogueEngine, OpenRouterClassifier,
    OutletApiClient, ProductAnswer, ProductAnswerer, ProductQaClient,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    engine: Arc<DialogueEngine>,
    products: Arc<dyn ProductAnswerer>,
    app_name: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    user: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    response: String,
}

#[derive(Debug, Deserialize)]
struct QaParams {
    query: String,
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "message": format!("{} is running", state.app_name),
    }))
}

/// One chat turn: conversation id is the user field, per the original API.
async fn chat(State(state): State<AppState>, Json(msg): Json<ChatMessage>) -> Json<ChatReply> {
    let result = state.engine.process_turn(&msg.user, &msg.content).await;
    Json(ChatReply {
        response: result.response_text,
    })
}

/// Product RAG proxy: forwards the question verbatim to the QA collaborator.
async fn products_qa(
    State(state): State<AppState>,
    Query(params): Query<QaParams>,
) -> Result<Json<ProductAnswer>, (StatusCode, String)> {
    if params.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "`query` parameter is required.".to_string()));
    }
    match state.products.answer(&params.query).await {
        Ok(answer) => Ok(Json(answer)),
        Err(e) => {
            tracing::warn!(target: "kopi::gateway", error = %e, "product QA collaborator failed");
            Err((
                StatusCode::BAD_GATEWAY,
                "Sorry, the product service is not reachable right now.".to_string(),
            ))
        }
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/products/qa", get(products_qa))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Load .env first; all API keys stay in the backend.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[kopi-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(target: "kopi::gateway", error = %e, "could not load configuration");
            std::process::exit(1);
        }
    };

    let classifier = match OpenRouterClassifier::from_env() {
        Some(classifier) => match &config.openrouter_model {
            Some(model) => classifier.with_model(model),
            None => classifier,
        },
        None => {
            tracing::error!(
                target: "kopi::gateway",
                "OPENROUTER_API_KEY is not set; the intent classifier cannot start"
            );
            std::process::exit(1);
        }
    };

    let log_path = format!("{}/kopi_conversations", config.storage_path.trim_end_matches('/'));
    let log = match ConversationLog::open_path(&log_path) {
        Ok(log) => Arc::new(log),
        Err(e) => {
            tracing::error!(target: "kopi::gateway", error = %e, path = %log_path, "could not open conversation log");
            std::process::exit(1);
        }
    };

    let outlets = Arc::new(OutletApiClient::new(&config.outlet_api_base));
    let engine = DialogueEngine::new(Arc::new(classifier), ActionDispatcher::new(outlets))
        .with_log(log);

    let state = AppState {
        engine: Arc::new(engine),
        products: Arc::new(ProductQaClient::new(&config.products_api_base)),
        app_name: Arc::from(config.app_name.as_str()),
    };

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(target: "kopi::gateway", %addr, app = %state.app_name, "gateway listening");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(target: "kopi::gateway", error = %e, %addr, "could not bind");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!(target: "kopi::gateway", error = %e, "server exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use kopi_core::{IntentParser, LookupError, ParsedIntent, UNKNOWN_REPLY};
    use tower::util::ServiceExt;

    struct UnknownParser;

    #[async_trait::async_trait]
    impl IntentParser for UnknownParser {
        async fn parse_intent(&self, _utterance: &str) -> ParsedIntent {
            ParsedIntent::unknown()
        }
    }

    struct FixedProducts;

    #[async_trait::async_trait]
    impl ProductAnswerer for FixedProducts {
        async fn answer(&self, _query: &str) -> Result<ProductAnswer, LookupError> {
            Ok(ProductAnswer {
                answer: "The 500ml tumbler keeps drinks hot.".to_string(),
                sources: vec!["ZUS All-Day Cup".to_string()],
            })
        }
    }

    fn test_state() -> AppState {
        let outlets = Arc::new(kopi_core::OutletApiClient::new("http://127.0.0.1:1"));
        AppState {
            engine: Arc::new(DialogueEngine::new(
                Arc::new(UnknownParser),
                ActionDispatcher::new(outlets),
            )),
            products: Arc::new(FixedProducts),
            app_name: Arc::from("Kopi Gateway"),
        }
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let app = router(test_state());
        let res = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_answers_with_the_engine_reply() {
        let app = router(test_state());
        let res = app
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"user": "alice", "content": "???"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["response"], UNKNOWN_REPLY);
    }

    #[tokio::test]
    async fn chat_rejects_a_malformed_body() {
        let app = router(test_state());
        let res = app
            .oneshot(
                Request::post("/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"content": "hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn products_qa_proxies_the_collaborator() {
        let app = router(test_state());
        let res = app
            .oneshot(
                Request::get("/products/qa?query=what%20drinkware%20is%20available")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let answer: ProductAnswer = serde_json::from_slice(&body).unwrap();
        assert_eq!(answer.sources, vec!["ZUS All-Day Cup".to_string()]);
    }
}
