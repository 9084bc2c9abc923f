use pamtutor::api::client::{format_history_window, MAX_HISTORY_CHARS};
use pamtutor::state::worksheet::{export_file_name, printable_text, sorted_answer_key};
use pamtutor::types::{Message, Worksheet, WorksheetAnswer, WorksheetQuestion};

fn user(text: &str) -> Message {
    Message::user(text)
}

#[test]
fn test_history_window_is_maximal_chronological_tail() {
    // Each formatted line is exactly 110 characters:
    // "Student: " (9) + 4-digit index + space + 95 filler (100) + "\n" (1).
    let history: Vec<Message> = (0..200)
        .map(|index| user(&format!("{index:04} {}", "x".repeat(95))))
        .collect();

    let window = format_history_window(&history);
    let window_chars = window.chars().count();

    // 90 lines of 110 chars is the largest tail within the 10,000 budget.
    assert_eq!(window.lines().count(), 90);
    assert_eq!(window_chars, 90 * 110);
    assert!(window_chars <= MAX_HISTORY_CHARS);
    assert!(window_chars + 110 > MAX_HISTORY_CHARS);

    // The newest message always survives, and order stays chronological.
    assert!(window.starts_with("Student: 0110 "));
    assert!(window.ends_with(&format!("Student: 0199 {}\n", "x".repeat(95))));
}

#[test]
fn test_answer_key_display_is_stable_under_reordering() {
    let worksheet = Worksheet {
        title: "Stability".to_string(),
        questions: vec![WorksheetQuestion {
            question_number: 1,
            question_text: "q".to_string(),
        }],
        answer_key: vec![
            WorksheetAnswer {
                question_number: 3,
                answer_text: "third".to_string(),
            },
            WorksheetAnswer {
                question_number: 1,
                answer_text: "first".to_string(),
            },
            WorksheetAnswer {
                question_number: 2,
                answer_text: "second".to_string(),
            },
        ],
    };

    let order: Vec<u32> = sorted_answer_key(&worksheet)
        .iter()
        .map(|answer| answer.question_number)
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_worksheet_export_round_trip() {
    let worksheet = Worksheet {
        title: "Kinematics Review".to_string(),
        questions: vec![WorksheetQuestion {
            question_number: 1,
            question_text: "What is $v = d/t$?".to_string(),
        }],
        answer_key: vec![WorksheetAnswer {
            question_number: 1,
            answer_text: "Average velocity.".to_string(),
        }],
    };

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join(export_file_name(&worksheet.title));
    std::fs::write(&path, printable_text(&worksheet)).expect("export write");

    let exported = std::fs::read_to_string(&path).expect("export read");
    assert!(exported.starts_with("Kinematics Review\n"));
    assert!(exported.contains("Answer Key"));
    assert!(exported.contains("1. Average velocity."));
    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("kinematics-review.txt")
    );
}
