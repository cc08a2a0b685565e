use engagement_core::Trigger;

/// Classify inbound text sent while a user is in `goodbye_sent` into the
/// trigger the caller should hand to `transition`. This belongs to a message
/// handler outside the core (§9) — the core's contract is only "given the
/// trigger, execute it." The mapping here is authoritative for tests
/// (spec.md §4.1 and GLOSSARY): `1`/`confuso`/`confused` → response 1,
/// `2`/`ocupado`/`busy` → response 2, `3`/`tudo certo`/`all good` → response 3.
pub fn classify_goodbye_response(text: &str) -> Option<Trigger> {
    let normalized = text.trim().to_lowercase();
    match normalized.as_str() {
        "1" | "confuso" | "confused" => Some(Trigger::GoodbyeResponse1),
        "2" | "ocupado" | "busy" => Some(Trigger::GoodbyeResponse2),
        "3" | "tudo certo" | "all good" => Some(Trigger::GoodbyeResponse3),
        _ => None,
    }
}
