//! Normalisation des erreurs en messages courts présentables à l'utilisateur.
//!
//! Aucune fonction de ce module ne peut échouer : une forme inconnue donne
//! toujours [`UNKNOWN_ERROR_MESSAGE`].

use std::error::Error as StdError;

use crate::infrastructure::error::AppError;

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

const TRAPPED_LABEL: &str = "Canister trapped:";
const REJECTED_LABEL: &str = "\"Rejected\":";

/// Position de `label` dans `text`, sans tenir compte de la casse ASCII
fn find_ignore_case(text: &str, label: &str) -> Option<usize> {
    text.to_ascii_lowercase().find(&label.to_ascii_lowercase())
}

/// Texte qui suit `label` jusqu'à la fin de la ligne
fn labeled_line<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let start = find_ignore_case(text, label)? + label.len();
    let rest = &text[start..];
    let line = rest
        .split('\n')
        .next()
        .unwrap_or(rest)
        .trim()
        .trim_matches('"')
        .trim();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

/// Extrait la raison la plus interne d'une enveloppe de rejet.
///
/// Le message "trapped" imbriqué est prioritaire sur la ligne "Rejected",
/// les lignes de métadonnées (canister, méthode) sont ignorées.
pub fn extract_rejection_reason(envelope: &str) -> Option<String> {
    if let Some(trapped) = labeled_line(envelope, TRAPPED_LABEL) {
        return Some(trapped.to_string());
    }

    let rejected = labeled_line(envelope, REJECTED_LABEL)?;
    let reason = labeled_line(rejected, TRAPPED_LABEL).unwrap_or(rejected);
    Some(reason.to_string())
}

/// Normalise un message brut (chaîne simple ou enveloppe verbeuse)
pub fn normalize_message(raw: &str) -> String {
    if raw.trim().is_empty() {
        return UNKNOWN_ERROR_MESSAGE.to_string();
    }
    extract_rejection_reason(raw).unwrap_or_else(|| raw.to_string())
}

/// Normalise n'importe quel objet erreur
pub fn normalize_error(error: &(dyn StdError + 'static)) -> String {
    if let Some(app_error) = error.downcast_ref::<AppError>() {
        return app_error.user_message();
    }
    if let Some(http_error) = error.downcast_ref::<reqwest::Error>() {
        // reqwest::Error n'est pas Clone ; on passe par sa description
        let app_error = match http_error.status() {
            Some(status) => AppError::RemoteHttp {
                operation: "calling a remote service".to_string(),
                status: status.as_u16(),
                body: String::new(),
            },
            None => AppError::Network {
                operation: "calling a remote service".to_string(),
            },
        };
        return app_error.user_message();
    }
    normalize_message(&error.to_string())
}
