//! Application wiring: routes, handlers and the startup guard's fatal mode.
//!
//! [`chat_app`] serves the chat page and its JSON API. [`fatal_app`] is what
//! runs instead when the API key is missing: it owns no session store, model
//! client or driver and answers every request with the configuration error.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::{ChatDriver, ChatEvent};
use crate::context::Context;
use crate::llm::ChatModel;
use crate::middleware::{LoggerMiddleware, Pipeline};
use crate::router::IntoHandler;
use crate::session::{CurrentSession, Message, SessionMiddleware, SessionStore};
use crate::ui;
use crate::{Response, Router, StatusCode};

/// Shared state of a running chat app.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub driver: Arc<ChatDriver>,
}

impl AppState {
    /// An empty session store and a driver for `model`.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            sessions: SessionStore::new(),
            driver: Arc::new(ChatDriver::new(model)),
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionView<'a> {
    system_prompt: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct PromptUpdate {
    system_prompt: String,
}

#[derive(Debug, Serialize)]
struct PromptUpdated {
    changed: bool,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    reply: Message,
    failed: bool,
}

#[derive(Debug, Serialize)]
struct ApiError<'a> {
    error: &'a str,
}

fn api_error(status: StatusCode, error: &str) -> Response {
    Response::json(status, &ApiError { error })
}

fn current_session(ctx: &Context) -> Result<CurrentSession, Response> {
    ctx.extensions()
        .get::<CurrentSession>()
        .cloned()
        .ok_or_else(|| {
            Response::new(StatusCode::InternalServerError).body("no session attached to request")
        })
}

/// The full chat application.
///
/// Routes:
///
/// | Route               | Behavior                                              |
/// |---------------------|-------------------------------------------------------|
/// | `GET /`             | the chat page                                         |
/// | `POST /`            | form submit (prompt + message), then `303` to `/`     |
/// | `GET /api/session`  | `{ system_prompt, messages }`                         |
/// | `PUT /api/prompt`   | `{ system_prompt }` → `{ changed }`                   |
/// | `POST /api/chat`    | `{ message, system_prompt? }` → `{ reply, failed }`   |
/// | `GET /healthz`      | `ok`, without creating a session                      |
///
/// Requests pass through [`LoggerMiddleware`] and then [`SessionMiddleware`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use wellbeing_chat::app::{AppState, chat_app};
/// use wellbeing_chat::llm::GeminiClient;
///
/// let app = chat_app(AppState::new(Arc::new(GeminiClient::new("key"))));
/// ```
pub fn chat_app(state: AppState) -> Pipeline {
    let mut router = Router::new();

    router.get("/healthz", |_ctx: Context| async { Response::new(StatusCode::Ok).body("ok") });

    router.get("/", |ctx: Context| async move {
        let current = match current_session(&ctx) {
            Ok(current) => current,
            Err(response) => return response,
        };
        let session = current.handle.lock().await;
        Response::html(StatusCode::Ok, ui::render_page(&session))
    });

    let driver = Arc::clone(&state.driver);
    router.post("/", move |ctx: Context| {
        let driver = Arc::clone(&driver);
        async move {
            let current = match current_session(&ctx) {
                Ok(current) => current,
                Err(response) => return response,
            };
            let mut form = match ctx.form() {
                Ok(form) => form,
                Err(e) => return Response::new(StatusCode::BadRequest).body(e.to_string()),
            };
            let event = ChatEvent {
                system_prompt: form.remove(ui::FIELD_SYSTEM_PROMPT),
                message: form.remove(ui::FIELD_MESSAGE),
            };

            let mut session = current.handle.lock().await;
            let outcome = driver.handle(&mut session, event).await;
            debug!(
                session = %current.id,
                prompt_changed = outcome.prompt_changed,
                turn = outcome.turn.is_some(),
                "form submitted"
            );
            Response::see_other("/")
        }
    });

    router.get("/api/session", |ctx: Context| async move {
        let current = match current_session(&ctx) {
            Ok(current) => current,
            Err(response) => return response,
        };
        let session = current.handle.lock().await;
        Response::json(
            StatusCode::Ok,
            &SessionView {
                system_prompt: session.system_prompt(),
                messages: session.transcript(),
            },
        )
    });

    router.put("/api/prompt", |ctx: Context| async move {
        let current = match current_session(&ctx) {
            Ok(current) => current,
            Err(response) => return response,
        };
        let update: PromptUpdate = match ctx.json() {
            Ok(update) => update,
            Err(e) => return api_error(StatusCode::BadRequest, &e.to_string()),
        };
        let changed = current
            .handle
            .lock()
            .await
            .update_system_prompt(&update.system_prompt);
        Response::json(StatusCode::Ok, &PromptUpdated { changed })
    });

    let driver = Arc::clone(&state.driver);
    router.post("/api/chat", move |ctx: Context| {
        let driver = Arc::clone(&driver);
        async move {
            let current = match current_session(&ctx) {
                Ok(current) => current,
                Err(response) => return response,
            };
            let request: ChatRequest = match ctx.json() {
                Ok(request) => request,
                Err(e) => return api_error(StatusCode::BadRequest, &e.to_string()),
            };
            if request.message.trim().is_empty() {
                return api_error(StatusCode::UnprocessableEntity, "message must not be empty");
            }

            let event = ChatEvent {
                system_prompt: request.system_prompt,
                message: Some(request.message),
            };
            let mut session = current.handle.lock().await;
            match driver.handle(&mut session, event).await.turn {
                Some(turn) => Response::json(
                    StatusCode::Ok,
                    &ChatReply {
                        reply: turn.reply,
                        failed: turn.failed,
                    },
                ),
                None => api_error(StatusCode::UnprocessableEntity, "message must not be empty"),
            }
        }
    });

    Pipeline::builder()
        .layer(Arc::new(LoggerMiddleware))
        .layer(Arc::new(SessionMiddleware::new(state.sessions).skip("/healthz")))
        .finish(router)
}

/// The app served when startup failed: every request gets `message` with a 503.
///
/// Pages get the HTML error page, `/api/` routes a JSON `{ "error": ... }`.
/// No session is created and no chat element is rendered.
pub fn fatal_app(message: impl Into<String>) -> Pipeline {
    let message: Arc<str> = Arc::from(message.into());
    let mut router = Router::new();
    router.get("/*", fatal_handler(Arc::clone(&message)));
    router.post("/*", fatal_handler(Arc::clone(&message)));
    router.put("/*", fatal_handler(message));

    Pipeline::builder()
        .layer(Arc::new(LoggerMiddleware))
        .finish(router)
}

fn fatal_handler(message: Arc<str>) -> impl IntoHandler {
    move |ctx: Context| {
        let message = Arc::clone(&message);
        async move {
            if ctx.request().path().starts_with("/api/") {
                api_error(StatusCode::ServiceUnavailable, &message)
            } else {
                Response::html(StatusCode::ServiceUnavailable, ui::render_fatal(&message))
            }
        }
    }
}
