//! The review form: editable text for each field plus the rules that turn
//! it into a [`ValidatedReviewPayload`].
//!
//! Every rule is evaluated independently, so a single `validate()` call
//! reports all invalid fields at once and the user can fix them in any order.

use super::{certidoes, date_mask};
use crate::model::{ProcessedFields, ValidatedReviewPayload};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

/// One of the nine review inputs, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReviewField {
    NumeroProcesso,
    Requerente,
    Parentesco,
    NomeFalecido,
    LocalObito,
    Data,
    IdParecer,
    IdDeclaracao,
    IdCertidoes,
}

impl ReviewField {
    pub const ALL: [ReviewField; 9] = [
        ReviewField::NumeroProcesso,
        ReviewField::Requerente,
        ReviewField::Parentesco,
        ReviewField::NomeFalecido,
        ReviewField::LocalObito,
        ReviewField::Data,
        ReviewField::IdParecer,
        ReviewField::IdDeclaracao,
        ReviewField::IdCertidoes,
    ];

    /// Wire name, as used in the JSON payload.
    pub fn name(self) -> &'static str {
        match self {
            ReviewField::NumeroProcesso => "numero_processo",
            ReviewField::Requerente => "requerente",
            ReviewField::Parentesco => "parentesco",
            ReviewField::NomeFalecido => "nome_falecido",
            ReviewField::LocalObito => "local_obito",
            ReviewField::Data => "data",
            ReviewField::IdParecer => "id_parecer",
            ReviewField::IdDeclaracao => "id_declaracao",
            ReviewField::IdCertidoes => "id_certidoes",
        }
    }

    /// Human-readable label for prompts.
    pub fn label(self) -> &'static str {
        match self {
            ReviewField::NumeroProcesso => "Case number",
            ReviewField::Requerente => "Applicant",
            ReviewField::Parentesco => "Kinship",
            ReviewField::NomeFalecido => "Deceased",
            ReviewField::LocalObito => "Place of death",
            ReviewField::Data => "Date of death (DD/MM/YYYY)",
            ReviewField::IdParecer => "Opinion ID",
            ReviewField::IdDeclaracao => "Death declaration ID",
            ReviewField::IdCertidoes => "Certificates (separated by , or ;)",
        }
    }

    /// Look a field up by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for ReviewField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-field validation messages. Never empty when returned as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<ReviewField, String>);

impl FieldErrors {
    pub fn get(&self, field: ReviewField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: ReviewField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Invalid fields in display order.
    pub fn fields(&self) -> impl Iterator<Item = ReviewField> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReviewField, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }

    fn insert(&mut self, field: ReviewField, message: String) {
        self.0.insert(field, message);
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} invalid field(s)", self.0.len())?;
        for (field, msg) in &self.0 {
            write!(f, "\n  {field}: {msg}")?;
        }
        Ok(())
    }
}

/// `DD/MM/YYYY` with ASCII digits only; `\d` would also admit other scripts.
static RE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{2})/([0-9]{2})/([0-9]{4})$").unwrap());

/// Editable review data, seeded from the server's [`ProcessedFields`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewForm {
    pub numero_processo: String,
    pub requerente: String,
    pub parentesco: String,
    pub nome_falecido: String,
    pub local_obito: String,
    pub data: String,
    pub id_parecer: String,
    pub id_declaracao: String,
    /// Raw delimited text, as typed.
    pub id_certidoes: String,
}

impl ReviewForm {
    /// Seed the form from processed fields; list certidões become `"a, b"`.
    pub fn from_processed(fields: ProcessedFields) -> Self {
        Self {
            id_certidoes: fields.id_certidoes.to_text(),
            numero_processo: fields.numero_processo,
            requerente: fields.requerente,
            parentesco: fields.parentesco,
            nome_falecido: fields.nome_falecido,
            local_obito: fields.local_obito,
            data: fields.data,
            id_parecer: fields.id_parecer,
            id_declaracao: fields.id_declaracao,
        }
    }

    pub fn get(&self, field: ReviewField) -> &str {
        match field {
            ReviewField::NumeroProcesso => &self.numero_processo,
            ReviewField::Requerente => &self.requerente,
            ReviewField::Parentesco => &self.parentesco,
            ReviewField::NomeFalecido => &self.nome_falecido,
            ReviewField::LocalObito => &self.local_obito,
            ReviewField::Data => &self.data,
            ReviewField::IdParecer => &self.id_parecer,
            ReviewField::IdDeclaracao => &self.id_declaracao,
            ReviewField::IdCertidoes => &self.id_certidoes,
        }
    }

    fn slot(&mut self, field: ReviewField) -> &mut String {
        match field {
            ReviewField::NumeroProcesso => &mut self.numero_processo,
            ReviewField::Requerente => &mut self.requerente,
            ReviewField::Parentesco => &mut self.parentesco,
            ReviewField::NomeFalecido => &mut self.nome_falecido,
            ReviewField::LocalObito => &mut self.local_obito,
            ReviewField::Data => &mut self.data,
            ReviewField::IdParecer => &mut self.id_parecer,
            ReviewField::IdDeclaracao => &mut self.id_declaracao,
            ReviewField::IdCertidoes => &mut self.id_certidoes,
        }
    }

    /// Replace a field's text verbatim.
    pub fn set(&mut self, field: ReviewField, value: impl Into<String>) {
        *self.slot(field) = value.into();
    }

    /// Apply a date keystroke through the `DD/MM/YYYY` mask.
    pub fn input_date(&mut self, raw: &str) -> &str {
        self.data = date_mask::format(&self.data, raw);
        &self.data
    }

    /// Live parsed view of the certidões text, for display while typing.
    pub fn certidoes_preview(&self) -> Vec<String> {
        certidoes::parse(&self.id_certidoes)
    }

    /// Check a single field; `None` when it is valid.
    pub fn validate_field(&self, field: ReviewField) -> Option<String> {
        let value = self.get(field);
        let msg = match field {
            ReviewField::NumeroProcesso => {
                min_len(value, 5, "Enter the case number (at least 5 characters).")
            }
            ReviewField::Requerente => min_len(value, 2, "Enter the applicant's name."),
            ReviewField::Parentesco => min_len(value, 2, "Enter the kinship."),
            ReviewField::NomeFalecido => min_len(value, 2, "Enter the deceased's name."),
            ReviewField::LocalObito => min_len(value, 2, "Enter the place of death."),
            ReviewField::Data => check_date(value),
            ReviewField::IdParecer => min_len(value, 1, "Enter the opinion ID."),
            ReviewField::IdDeclaracao => {
                min_len(value, 1, "Enter the death declaration ID.")
            }
            ReviewField::IdCertidoes => check_certidoes(value),
        };
        msg.map(str::to_string)
    }

    /// Run every rule; either all fields pass or every failure is reported.
    pub fn validate(&self) -> Result<ValidatedReviewPayload, FieldErrors> {
        let mut errors = FieldErrors::default();
        for field in ReviewField::ALL {
            if let Some(msg) = self.validate_field(field) {
                errors.insert(field, msg);
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidatedReviewPayload::new_unchecked(
            self.numero_processo.trim().to_string(),
            self.requerente.trim().to_string(),
            self.parentesco.trim().to_string(),
            self.nome_falecido.trim().to_string(),
            self.local_obito.trim().to_string(),
            self.data.trim().to_string(),
            self.id_parecer.trim().to_string(),
            self.id_declaracao.trim().to_string(),
            self.certidoes_preview(),
        ))
    }
}

fn char_len(s: &str) -> usize {
    s.trim().chars().count()
}

fn min_len(value: &str, min: usize, msg: &'static str) -> Option<&'static str> {
    (char_len(value) < min).then_some(msg)
}

fn check_date(value: &str) -> Option<&'static str> {
    const BAD_FORMAT: &str = "Date must be in DD/MM/YYYY format.";
    let Some(caps) = RE_DATE.captures(value.trim()) else {
        return Some(BAD_FORMAT);
    };
    let (Ok(day), Ok(month), Ok(year)) = (
        caps[1].parse::<u32>(),
        caps[2].parse::<u32>(),
        caps[3].parse::<i32>(),
    ) else {
        return Some(BAD_FORMAT);
    };
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(_) => None,
        None => Some("Date is not a valid calendar date."),
    }
}

fn check_certidoes(value: &str) -> Option<&'static str> {
    if char_len(value) < 1 {
        return Some("Enter at least one certificate.");
    }
    let items = certidoes::parse(value);
    if items.is_empty() {
        return Some("Enter at least one valid certificate.");
    }
    if items.iter().any(|item| item.chars().count() < 2) {
        return Some("Each certificate ID must have at least 2 characters.");
    }
    None
}
