use handlebars::{Handlebars, TemplateError};

pub const LOGIN: &str = "login";
pub const SIGNUP: &str = "signup";
pub const CREATE_LIVE_STREAM: &str = "create_live_stream";
pub const STREAM_CREATED: &str = "stream_created";
pub const VIEW_STREAMS: &str = "view_streams";

const LAYOUT_TEMPLATE: &str = include_str!("../templates/layout.hbs");
const PAGES: [(&str, &str); 5] = [
    (LOGIN, include_str!("../templates/login.hbs")),
    (SIGNUP, include_str!("../templates/signup.hbs")),
    (
        CREATE_LIVE_STREAM,
        include_str!("../templates/create_live_stream.hbs"),
    ),
    (STREAM_CREATED, include_str!("../templates/stream_created.hbs")),
    (VIEW_STREAMS, include_str!("../templates/view_streams.hbs")),
];

/// Registry with the shared layout and every page of the portal.
pub fn registry() -> Result<Handlebars<'static>, TemplateError> {
    let mut handlebars = Handlebars::new();
    handlebars.register_partial("layout", LAYOUT_TEMPLATE)?;
    for (name, template) in PAGES {
        handlebars.register_template_string(name, template)?;
    }
    Ok(handlebars)
}
