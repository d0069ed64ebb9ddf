//! Line-based terminal front end for quiz and flashcard sessions.

use std::error::Error;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use assess_core::model::{AnswerShape, Item, Outcome};
use services::{
    CardPhase, CardStep, CompletionReport, FlashcardPlayer, PersistenceState, QuizPlayer,
    ResultListItem, SessionError, SessionHandle, SessionSnapshot,
};

const PERSIST_ATTEMPTS: u32 = 3;

type BoxError = Box<dyn Error>;

/// What the learner typed, or the session ending under them.
enum Input {
    Line(String),
    Closed,
    SessionEnded,
}

pub struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    pub fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Next input line, unless the session turns terminal first (timer expiry).
    async fn read(&mut self, session: &SessionHandle) -> Result<Input, BoxError> {
        let mut updates = session.subscribe();
        tokio::select! {
            line = self.lines.next_line() => Ok(match line? {
                Some(line) => Input::Line(line.trim().to_owned()),
                None => Input::Closed,
            }),
            ended = updates.wait_for(SessionSnapshot::is_terminal) => {
                ended?;
                Ok(Input::SessionEnded)
            }
        }
    }

    //
    // ─── QUIZ ──────────────────────────────────────────────────────────────────
    //

    pub async fn run_quiz(&mut self, quiz: &QuizPlayer) -> Result<Option<CompletionReport>, BoxError> {
        println!("Commands: <n> choose option, t/f, text answer, s skip, n next, p prev,");
        println!("          g <k> go to question, grid, submit, quit");

        loop {
            let snapshot = quiz.session().snapshot().await?;
            if snapshot.is_terminal() {
                break;
            }
            if let Some(item) = quiz.current_question() {
                print_question(&snapshot, item);
            }

            let line = match self.read(quiz.session()).await? {
                Input::Line(line) => line,
                Input::SessionEnded => {
                    println!("Time is up.");
                    break;
                }
                Input::Closed => {
                    quiz.session().abandon().await?;
                    return Ok(None);
                }
            };

            let result = match line.as_str() {
                "submit" => break,
                "quit" => {
                    quiz.session().abandon().await?;
                    return Ok(None);
                }
                "s" => quiz.skip_current().await.map(drop),
                "n" => quiz.next().await.map(drop),
                "p" => quiz.previous().await.map(drop),
                "grid" => {
                    print_grid(quiz);
                    Ok(())
                }
                "t" | "true" => quiz.answer_boolean(true).await.map(drop),
                "f" | "false" => quiz.answer_boolean(false).await.map(drop),
                other => match parse_go_to(other) {
                    Some(k) => quiz.jump_to(k.saturating_sub(1)).await.map(drop),
                    None => answer_free_form(quiz, other).await,
                },
            };
            report_rejection(result)?;
        }

        Ok(Some(quiz.submit().await?))
    }

    //
    // ─── FLASHCARDS ────────────────────────────────────────────────────────────
    //

    pub async fn run_flashcards(
        &mut self,
        player: &mut FlashcardPlayer,
    ) -> Result<Option<CompletionReport>, BoxError> {
        println!("Commands: <enter> reveal, y knew it, n didn't, s skip, pause, resume, finish, quit");

        loop {
            let Some(card) = player.current_card() else {
                break;
            };
            match player.phase() {
                CardPhase::Prompt => println!("\n{}", card.prompt()),
                CardPhase::Answer => println!("  -> {}", card.correct_answer_text()),
            }

            let line = match self.read(player.session()).await? {
                Input::Line(line) => line,
                Input::SessionEnded => break,
                Input::Closed => {
                    player.session().abandon().await?;
                    return Ok(None);
                }
            };

            let step = match line.as_str() {
                "" => {
                    player.reveal()?;
                    continue;
                }
                "y" => player.mark_known().await,
                "n" => player.mark_unknown().await,
                "s" => player.skip().await,
                "pause" => {
                    report_rejection(player.pause().await)?;
                    continue;
                }
                "resume" => {
                    report_rejection(player.resume().await)?;
                    continue;
                }
                "finish" => break,
                "quit" => {
                    player.session().abandon().await?;
                    return Ok(None);
                }
                other => {
                    println!("unknown command: {other}");
                    continue;
                }
            }?;
            if let CardStep::Finished(report) = step {
                return Ok(Some(report));
            }
        }

        Ok(Some(player.finish().await?))
    }
}

async fn answer_free_form(quiz: &QuizPlayer, input: &str) -> Result<(), SessionError> {
    let Some(item) = quiz.current_question() else {
        return Err(SessionError::NoCurrentItem);
    };
    match item.answer() {
        AnswerShape::SingleChoice { .. } => match input.parse::<usize>() {
            Ok(n) if n >= 1 => quiz.choose(n - 1).await.map(drop),
            _ => {
                println!("enter an option number");
                Ok(())
            }
        },
        AnswerShape::FreeText { .. } => quiz.answer_text(input).await.map(drop),
        AnswerShape::Boolean { .. } => {
            println!("answer with t or f");
            Ok(())
        }
    }
}

fn parse_go_to(input: &str) -> Option<usize> {
    input.strip_prefix("g ")?.trim().parse().ok()
}

/// Navigation and input mistakes are shown and the loop continues.
fn report_rejection(result: Result<(), SessionError>) -> Result<(), SessionError> {
    match result {
        Ok(()) => Ok(()),
        Err(
            err @ (SessionError::Navigation(_)
            | SessionError::Timer(_)
            | SessionError::NoCurrentItem),
        ) => {
            println!("{err}");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn print_question(snapshot: &SessionSnapshot, item: &Item) {
    let remaining = snapshot
        .remaining_secs
        .map(|secs| format!("  [{}:{:02} left]", secs / 60, secs % 60))
        .unwrap_or_default();
    println!(
        "\nQuestion {}/{}{remaining}",
        snapshot.position + 1,
        snapshot.item_count
    );
    println!("{}", item.prompt());
    for (i, option) in item.options().iter().enumerate() {
        println!("  {}. {option}", i + 1);
    }
    if matches!(item.answer(), AnswerShape::Boolean { .. }) {
        println!("  (t)rue / (f)alse");
    }
}

fn print_grid(quiz: &QuizPlayer) {
    let cells: Vec<String> = quiz
        .question_grid()
        .iter()
        .map(|cell| {
            let mark = match cell.status {
                Outcome::Unseen => ' ',
                Outcome::Skipped => '-',
                Outcome::Correct | Outcome::Incorrect => '*',
            };
            if cell.is_current {
                format!("[{}{mark}]", cell.index + 1)
            } else {
                format!(" {}{mark} ", cell.index + 1)
            }
        })
        .collect();
    println!("{}", cells.join(""));
}

/// Print the result and make sure it is stored, retrying a few times.
pub async fn finish(session: &SessionHandle, report: &CompletionReport) -> Result<(), BoxError> {
    let summary = &report.summary;
    println!();
    println!(
        "Score: {}% ({} correct, {} incorrect, {} skipped, {} unanswered) in {}s",
        summary.percentage(),
        summary.correct_count(),
        summary.incorrect_count(),
        summary.skipped_count(),
        summary.unanswered_count(),
        summary.time_spent_secs(),
    );
    println!(
        "{}",
        if summary.passed() { "Passed" } else { "Not passed" }
    );

    let mut state = report.persistence.clone();
    let mut attempt = 1;
    while let PersistenceState::Failed { message } = &state {
        if attempt >= PERSIST_ATTEMPTS {
            println!("Could not save the result: {message}");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
        attempt += 1;
        state = match session.retry_persist().await {
            Ok(id) => PersistenceState::Stored { id },
            Err(err) if err.is_retryable() => PersistenceState::Failed {
                message: err.to_string(),
            },
            Err(err) => return Err(err.into()),
        };
    }
    Ok(())
}

pub fn print_history(items: &[ResultListItem]) {
    if items.is_empty() {
        println!("No results yet.");
        return;
    }
    for item in items {
        println!(
            "{}  {:<20} {:>3}%  {:>2}/{:<2}  {:<10} {}",
            item.completed_at.format("%Y-%m-%d %H:%M"),
            item.mode.as_str(),
            item.percentage,
            item.correct,
            item.total,
            item.completion_reason.as_str(),
            if item.passed { "pass" } else { "fail" },
        );
    }
}
