//! Extraction of quiz questions from free-form model output.
//!
//! Models are asked for a bare JSON array, but in practice they wrap it in code fences, prefix
//! it with prose, nest it under a `questions` key, or use their own field names. The parser
//! recovers whatever well-formed questions it can and only fails when none survive.
use serde_json::{Map, Value};

use crate::models::QuizQuestion;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizParseError {
    #[error("Failed to parse quiz data from the model's response: no JSON found")]
    NoJson,
    #[error("Failed to parse quiz data from the model's response: no valid questions")]
    NoQuestions,
}

const PROMPT_KEYS: &[&str] = &["prompt", "question", "text"];
const CHOICE_KEYS: &[&str] = &["choices", "options", "answers"];
const ANSWER_KEYS: &[&str] = &["correctIndex", "correctAnswer", "answer", "correct"];
const LIST_KEYS: &[&str] = &["questions", "quiz", "items"];

/// Parses up to `max` questions out of `text`.
pub fn parse_questions(text: &str, max: usize) -> Result<Vec<QuizQuestion>, QuizParseError> {
    // A fence may hold only a note while the questions sit outside it.
    let fenced = strip_code_fence(text);
    let whole = text.trim();
    let candidates = if fenced == whole {
        vec![whole]
    } else {
        vec![fenced, whole]
    };

    let mut error = QuizParseError::NoJson;
    for body in candidates {
        let Some(value) = first_json_value(body) else {
            continue;
        };
        let questions: Vec<QuizQuestion> = question_items(&value)
            .into_iter()
            .filter_map(|item| item.as_object().and_then(parse_question))
            .take(max)
            .collect();
        if !questions.is_empty() {
            return Ok(questions);
        }
        error = QuizParseError::NoQuestions;
    }
    Err(error)
}

/// Returns the contents of the first fenced block, or the whole text if there is none.
fn strip_code_fence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text.trim();
    };
    let after_open = &text[open + 3..];
    // Skip the info string (```json)
    let content_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let content = &after_open[content_start..];
    match content.find("```") {
        Some(close) => content[..close].trim(),
        None => content.trim(),
    }
}

/// Finds the first array or object that parses and holds at least one object, ignoring
/// anything after it.
fn first_json_value(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| *c == '[' || *c == '{')
        .find_map(|(i, _)| {
            serde_json::Deserializer::from_str(&text[i..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
                .filter(|value| question_items(value).iter().any(|item| item.is_object()))
        })
}

fn question_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => LIST_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .map(|items| items.iter().collect())
            .unwrap_or_else(|| {
                if looks_like_question(map) {
                    vec![value]
                } else {
                    Vec::new()
                }
            }),
        _ => Vec::new(),
    }
}

fn looks_like_question(map: &Map<String, Value>) -> bool {
    PROMPT_KEYS.iter().any(|k| map.contains_key(*k))
        && CHOICE_KEYS.iter().any(|k| map.contains_key(*k))
}

fn first_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

fn parse_question(map: &Map<String, Value>) -> Option<QuizQuestion> {
    let prompt = first_field(map, PROMPT_KEYS)?.as_str()?.trim();
    if prompt.is_empty() {
        return None;
    }

    let choices: Vec<String> = first_field(map, CHOICE_KEYS)?
        .as_array()?
        .iter()
        .map(|choice| choice.as_str().map(str::trim))
        .collect::<Option<Vec<_>>>()?
        .into_iter()
        .map(str::to_string)
        .collect();
    if choices.len() < 2 || choices.iter().any(String::is_empty) {
        return None;
    }

    let correct_index = resolve_answer(first_field(map, ANSWER_KEYS)?, &choices)?;

    Some(QuizQuestion {
        prompt: prompt.to_string(),
        choices,
        correct_index,
    })
}

/// Accepts an index, a choice letter ("B", "b)"), or the text of the correct choice.
fn resolve_answer(answer: &Value, choices: &[String]) -> Option<usize> {
    let index = match answer {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => answer_from_text(s.trim(), choices)?,
        _ => return None,
    };
    (index < choices.len()).then_some(index)
}

fn answer_from_text(answer: &str, choices: &[String]) -> Option<usize> {
    if answer.is_empty() {
        return None;
    }
    if let Some(i) = choices.iter().position(|c| c.eq_ignore_ascii_case(answer)) {
        return Some(i);
    }
    if let Some(i) = letter_index(answer) {
        return Some(i);
    }
    let bare = strip_label(answer);
    choices
        .iter()
        .position(|c| strip_label(c).eq_ignore_ascii_case(bare))
}

/// "B", "b", "B)", "B." map to index 1.
fn letter_index(answer: &str) -> Option<usize> {
    let mut chars = answer.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let rest = chars.as_str();
    if letter.is_ascii_uppercase() && (rest.is_empty() || matches!(rest, ")" | "." | ":")) {
        Some((letter as u8 - b'A') as usize)
    } else {
        None
    }
}

/// Removes a leading choice label such as "B) ", "c. " or "A: ".
fn strip_label(choice: &str) -> &str {
    let mut chars = choice.char_indices();
    match (chars.next(), chars.next()) {
        (Some((_, letter)), Some((i, sep)))
            if letter.is_ascii_alphabetic() && matches!(sep, ')' | '.' | ':') =>
        {
            let rest = &choice[i + sep.len_utf8()..];
            if rest.starts_with(char::is_whitespace) {
                rest.trim_start()
            } else {
                choice
            }
        }
        _ => choice,
    }
}
