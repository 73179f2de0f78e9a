//! Canned replies for the visitor chat widget, and the checks that hand a
//! visitor over to a human.

use serde::{Deserialize, Serialize};

pub const WELCOME: &str = "Hi! I'm the Estospaces assistant. How can I help you today?\n\n\
I can answer questions about:\n\
- Our services and features\n\
- Pricing and plans\n\
- Property listings\n\
- Account setup\n\n\
Type your question or choose \"Talk to Human\" to reach our team!";

pub const FALLBACK: &str = "I'm not sure I understand that question.\n\n\
Would you like to:\n\
1. Rephrase your question\n\
2. Talk to a human team member";

pub const ESCALATION: &str = "Connecting you with a human team member...\n\n\
One of our support specialists will be with you shortly. Please hold on!";

pub const HELP_OFFER: &str = "I sense you might need some extra help. \
Would you like me to connect you with a human team member?";

pub const ESCALATION_KEYWORDS: &[&str] = &[
    "human", "agent", "person", "real person", "talk to someone",
    "speak to", "representative", "operator", "staff", "team member",
];

pub const HELP_KEYWORDS: &[&str] = &[
    "help", "urgent", "emergency", "complaint", "frustrated",
    "angry", "disappointed", "not working", "broken", "error",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CannedResponse {
    pub keywords: Vec<String>,
    pub answer: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

fn default_priority() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match<'a> {
    pub answer: &'a str,
    pub matched_keywords: Vec<&'a str>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Reply {
    Escalate(String),
    Answer(String),
    OfferHelp(String),
    Fallback(String),
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|k| text.contains(k))
}

pub fn should_escalate(text: &str) -> bool {
    mentions_any(text, ESCALATION_KEYWORDS)
}

pub fn needs_help(text: &str) -> bool {
    mentions_any(text, HELP_KEYWORDS)
}

/// Best catalog entry for `text`: matched keywords times priority. The first
/// entry reaching the top score wins.
pub fn match_response<'a>(text: &str, catalog: &'a [CannedResponse]) -> Option<Match<'a>> {
    let text = text.to_lowercase();
    let mut best: Option<Match<'a>> = None;

    for response in catalog {
        let matched_keywords: Vec<&str> = response
            .keywords
            .iter()
            .filter(|k| text.contains(&k.to_lowercase()))
            .map(String::as_str)
            .collect();
        let score = matched_keywords.len() as u32 * response.priority;

        if score > best.as_ref().map_or(0, |b| b.score) {
            best = Some(Match {
                answer: &response.answer,
                matched_keywords,
                score,
            });
        }
    }

    best
}

pub fn reply(text: &str, catalog: &[CannedResponse]) -> Reply {
    if should_escalate(text) {
        return Reply::Escalate(ESCALATION.to_owned());
    }
    if let Some(best) = match_response(text, catalog) {
        return Reply::Answer(best.answer.to_owned());
    }
    if needs_help(text) {
        return Reply::OfferHelp(HELP_OFFER.to_owned());
    }
    Reply::Fallback(FALLBACK.to_owned())
}

pub fn default_catalog() -> Vec<CannedResponse> {
    let entry = |keywords: &[&str], answer: &str, priority: u32| CannedResponse {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        answer: answer.to_owned(),
        priority,
    };

    vec![
        entry(
            &["price", "pricing", "cost", "plan", "fee"],
            "Early members join free during the launch. Paid plans start once listings go live, and you'll be told well before then.",
            2,
        ),
        entry(
            &["listing", "property", "properties", "house", "flat", "apartment"],
            "We're onboarding verified properties now. Join the waitlist to get a sneak peek before launch.",
            1,
        ),
        entry(
            &["account", "sign up", "signup", "register", "login"],
            "Sign up with your email on the home page. We'll send a link to finish setting up your account.",
            1,
        ),
        entry(
            &["launch", "when", "open", "available"],
            "We're launching soon. Keep an eye on the countdown on our home page!",
            1,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_beats_everything() {
        let catalog = default_catalog();
        assert!(matches!(reply("Can I speak to a real person about pricing?", &catalog), Reply::Escalate(_)));
    }

    #[test]
    fn priority_weights_score() {
        let catalog = default_catalog();
        let best = match_response("what does a property cost", &catalog).unwrap();

        // pricing: 1 keyword x2 beats listings: 1 keyword x1
        assert_eq!(best.score, 2);
        assert_eq!(best.matched_keywords, ["cost"]);
    }

    #[test]
    fn help_offer_and_fallback() {
        assert_eq!(reply("this is broken", &[]), Reply::OfferHelp(HELP_OFFER.to_owned()));
        assert_eq!(reply("bonjour", &[]), Reply::Fallback(FALLBACK.to_owned()));
        assert!(match_response("anything", &[]).is_none());
    }
}
