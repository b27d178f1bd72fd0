//! Subject and HTML body for each kind of outbound message.

use super::models::NotificationKind;

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateContext {
    SigningRequest {
        contract_title: String,
        recipient_name: String,
        signing_link: Option<String>,
    },
    AlertTriggered {
        rule_name: String,
        metric: String,
        value: f64,
        operator: String,
        threshold: f64,
    },
    StageChanged {
        entity_name: String,
        from_stage: String,
        to_stage: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub subject: String,
    pub html_body: String,
}

impl TemplateContext {
    pub fn kind(&self) -> NotificationKind {
        match self {
            TemplateContext::SigningRequest { .. } => NotificationKind::SigningRequest,
            TemplateContext::AlertTriggered { .. } => NotificationKind::AlertTriggered,
            TemplateContext::StageChanged { .. } => NotificationKind::StageChanged,
        }
    }

    pub fn render(&self) -> RenderedMessage {
        match self {
            TemplateContext::SigningRequest {
                contract_title,
                recipient_name,
                signing_link,
            } => {
                let link = match signing_link {
                    Some(link) => format!(
                        "<p><a href=\"{0}\">Review and sign</a></p>",
                        escape_html(link)
                    ),
                    None => "<p>You will find the document in your signing inbox.</p>".to_string(),
                };
                RenderedMessage {
                    subject: format!("Signature requested: {}", contract_title),
                    html_body: format!(
                        "<p>Hello {},</p><p>You have been asked to sign <strong>{}</strong>.</p>{}",
                        escape_html(recipient_name),
                        escape_html(contract_title),
                        link
                    ),
                }
            }
            TemplateContext::AlertTriggered {
                rule_name,
                metric,
                value,
                operator,
                threshold,
            } => RenderedMessage {
                subject: format!("Alert: {}", rule_name),
                html_body: format!(
                    "<p>Alert <strong>{}</strong> fired.</p><p><code>{}</code> = {} ({} {})</p>",
                    escape_html(rule_name),
                    escape_html(metric),
                    value,
                    escape_html(operator),
                    threshold
                ),
            },
            TemplateContext::StageChanged {
                entity_name,
                from_stage,
                to_stage,
            } => RenderedMessage {
                subject: format!("{} moved to {}", entity_name, to_stage),
                html_body: format!(
                    "<p><strong>{}</strong> moved from {} to {}.</p>",
                    escape_html(entity_name),
                    escape_html(from_stage),
                    escape_html(to_stage)
                ),
            },
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
