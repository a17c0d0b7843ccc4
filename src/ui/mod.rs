//! Server-rendered chat page.
//!
//! The page is one form: the sidebar prompt editor and the message box at the
//! bottom submit together, so every submission carries the editor's current
//! text alongside the message. No JavaScript is required.

use std::fmt::Write as _;

use pulldown_cmark_escape::escape_html;

use crate::session::{Role, Session};

pub mod markdown;

pub const PAGE_TITLE: &str = "👮 Bengaluru Police Well-being Chatbot";
pub const PROMPT_HEADING: &str = "📝 System Prompt";
pub const PROMPT_LABEL: &str = "Set the system prompt:";
pub const INPUT_PLACEHOLDER: &str = "Type your message...";

/// Form field names shared by the page and the submit handler.
pub const FIELD_SYSTEM_PROMPT: &str = "system_prompt";
pub const FIELD_MESSAGE: &str = "message";

const STYLE: &str = r#"
* { box-sizing: border-box; }
body { margin: 0; font-family: system-ui, -apple-system, "Segoe UI", sans-serif; color: #1f2330; background: #fff; }
form.app { display: flex; min-height: 100vh; }
aside { width: 22rem; flex: none; padding: 1.5rem; background: #f0f2f6; }
aside h2 { font-size: 1.1rem; margin: 0 0 1rem; }
aside label { display: block; font-size: .9rem; margin-bottom: .4rem; }
aside textarea { width: 100%; height: 150px; padding: .6rem; font: inherit; border: 1px solid #d0d4dc; border-radius: .4rem; resize: vertical; }
aside button { margin-top: .6rem; padding: .4rem .9rem; border: 1px solid #d0d4dc; border-radius: .4rem; background: #fff; cursor: pointer; }
main { flex: 1; display: flex; flex-direction: column; padding: 2rem 3rem 1rem; }
main h1 { margin-top: 0; }
.transcript { flex: 1; }
.bubble { display: flex; gap: .8rem; padding: .8rem 1rem; border-radius: .6rem; margin-bottom: .6rem; }
.bubble.assistant { background: #f7f8fa; }
.bubble .avatar { flex: none; width: 2rem; height: 2rem; border-radius: .4rem; display: grid; place-items: center; }
.bubble.user .avatar { background: #ff4b4b; color: #fff; }
.bubble.assistant .avatar { background: #ffbd45; }
.bubble .content > :first-child { margin-top: 0; }
.bubble .content > :last-child { margin-bottom: 0; }
.chat-input { position: sticky; bottom: 0; padding: 1rem 0; background: #fff; }
.chat-input input { width: 100%; padding: .8rem 1rem; font: inherit; border: 1px solid #d0d4dc; border-radius: .6rem; }
.fatal { margin: 2rem 3rem; padding: 1rem 1.2rem; border-radius: .5rem; background: #ffebeb; color: #7d1a1a; }
"#;

/// Escapes text for use in HTML element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing to a String cannot fail.
    let _ = escape_html(&mut out, text);
    out
}

fn document(body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = escape(PAGE_TITLE),
    )
}

/// The chat page for `session`: prompt editor, transcript in order, input box.
pub fn render_page(session: &Session) -> String {
    let mut transcript = String::new();
    for message in session.transcript() {
        let avatar = match message.role {
            Role::User => "🙂",
            Role::Assistant => "🤖",
        };
        // Writing to a String cannot fail.
        let _ = write!(
            transcript,
            "<div class=\"bubble {role}\" data-role=\"{role}\"><div class=\"avatar\">{avatar}</div>\
             <div class=\"content\">{content}</div></div>\n",
            role = message.role.as_str(),
            content = markdown::render(&message.content),
        );
    }

    let body = format!(
        "<form class=\"app\" method=\"post\" action=\"/\">\n\
         <aside>\n<h2>{heading}</h2>\n\
         <label for=\"{FIELD_SYSTEM_PROMPT}\">{label}</label>\n\
         <textarea id=\"{FIELD_SYSTEM_PROMPT}\" name=\"{FIELD_SYSTEM_PROMPT}\">{prompt}</textarea>\n\
         <button type=\"submit\">Apply</button>\n</aside>\n\
         <main>\n<h1>{title}</h1>\n\
         <section class=\"transcript\">\n{transcript}</section>\n\
         <div class=\"chat-input\"><input type=\"text\" name=\"{FIELD_MESSAGE}\" placeholder=\"{placeholder}\" \
         autocomplete=\"off\" autofocus></div>\n\
         </main>\n</form>",
        heading = escape(PROMPT_HEADING),
        label = escape(PROMPT_LABEL),
        prompt = escape(session.system_prompt()),
        title = escape(PAGE_TITLE),
        placeholder = escape(INPUT_PLACEHOLDER),
    );

    document(&body)
}

/// The page shown instead of the chat when startup failed. It contains no
/// chat elements.
pub fn render_fatal(message: &str) -> String {
    document(&format!(
        "<div class=\"fatal\" role=\"alert\">{}</div>",
        escape(message)
    ))
}
