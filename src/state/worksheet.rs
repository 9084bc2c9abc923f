use crate::types::{Worksheet, WorksheetAnswer};

/// Answer-key display order is ascending by question number no matter how
/// the generator ordered the entries.
pub fn sorted_answer_key(worksheet: &Worksheet) -> Vec<&WorksheetAnswer> {
    let mut answers: Vec<&WorksheetAnswer> = worksheet.answer_key.iter().collect();
    answers.sort_by_key(|answer| answer.question_number);
    answers
}

/// Plain-text rendition of the worksheet for the print spooler or a file
/// export. Questions keep the generator's order; the answer key is sorted.
pub fn printable_text(worksheet: &Worksheet) -> String {
    let mut out = String::new();
    out.push_str(&worksheet.title);
    out.push_str("\n");
    out.push_str(&"=".repeat(worksheet.title.chars().count().max(8)));
    out.push_str("\n\n");

    for question in &worksheet.questions {
        out.push_str(&format!(
            "{}. {}\n\n",
            question.question_number, question.question_text
        ));
    }

    out.push_str("----------------------------------------\n");
    out.push_str("Answer Key\n");
    out.push_str("----------------------------------------\n\n");

    for answer in sorted_answer_key(worksheet) {
        out.push_str(&format!(
            "{}. {}\n",
            answer.question_number, answer.answer_text
        ));
    }

    out
}

/// File name used when the print spooler is unavailable and the worksheet is
/// exported next to the working directory instead.
pub fn export_file_name(title: &str) -> String {
    let stem: String = title
        .chars()
        .map(|ch| if ch.is_alphanumeric() { ch } else { '-' })
        .collect();
    let stem = stem.trim_matches('-').to_lowercase();
    if stem.is_empty() {
        "worksheet.txt".to_string()
    } else {
        format!("{stem}.txt")
    }
}
