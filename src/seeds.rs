//! Seme registry loaded once at process start.
//!
//! The registry is read-only after construction and injected wherever seme
//! lookups are needed. A missing or unparsable data file must not prevent
//! startup: the registry then contains only the built-in fallback seme for
//! the unbounded flow, and every other lookup fails as a client error.

use crate::models::{Seme, Sigillo};
use crate::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{error, info};

/// Id of the distinguished unbounded seme (single-shot echo+sigillo flow).
pub const SEME_FLUSSO_ID: &str = "sem_99";

pub struct SemeRegistry {
    semi: HashMap<String, Seme>,
}

impl SemeRegistry {
    /// Load the seme table from a JSON file.
    ///
    /// Never fails: on a missing file or parse error the registry degrades
    /// to the single fallback seme for [`SEME_FLUSSO_ID`].
    pub fn load(path: &Path) -> Self {
        match Self::read_file(path) {
            Ok(semi) => {
                info!("Loaded {} semi from {}", semi.len(), path.display());
                Self::from_semi(semi)
            }
            Err(e) => {
                error!(
                    "Could not load semi from {}: {}. Falling back to the built-in {} seme.",
                    path.display(),
                    e,
                    SEME_FLUSSO_ID
                );
                Self::from_semi(vec![Self::fallback_seme()])
            }
        }
    }

    fn read_file(path: &Path) -> Result<Vec<Seme>> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Build a registry from an in-memory seme list (tests, embedders).
    pub fn from_semi(semi: Vec<Seme>) -> Self {
        Self {
            semi: semi.into_iter().map(|seme| (seme.id.clone(), seme)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Seme> {
        self.semi.get(id)
    }

    pub fn len(&self) -> usize {
        self.semi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.semi.is_empty()
    }

    fn fallback_seme() -> Seme {
        Seme {
            id: SEME_FLUSSO_ID.to_string(),
            nome: "L'Eco Universale".to_string(),
            frase_finale: "La verità si manifesta nella scrittura libera.".to_string(),
            sigillo: Sigillo {
                simbolo_dominante: "❓".to_string(),
                immagine: "Un sigillo di riserva dovuto a dati mancanti.".to_string(),
                colore: "#AAAAAA".to_string(),
                forma: "quadrato".to_string(),
                codice_sigillo: "SIG-FB-99".to_string(),
            },
        }
    }
}
