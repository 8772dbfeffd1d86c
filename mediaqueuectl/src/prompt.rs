use std::io::Write;

use async_trait::async_trait;
use mediaqueue_core::OperatorPrompt;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;

const MAX_TRIES: usize = 3;

/// Asks on the controlling terminal. End of input counts as no answer.
///
/// Reads go through tokio so an interrupt is still noticed while the
/// operator has not answered yet.
pub struct TerminalPrompt<R> {
    input: Mutex<R>,
}

impl TerminalPrompt<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin> TerminalPrompt<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }

    async fn read_answer(&self) -> Option<String> {
        let mut input = self.input.lock().await;
        let mut line = String::new();
        match input.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> OperatorPrompt for TerminalPrompt<R> {
    fn notify(&self) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }

    async fn ask_integer(&self, question: &str, default: i64) -> Option<i64> {
        for _ in 0..MAX_TRIES {
            eprint!("{question} [{default}]: ");
            let _ = std::io::stderr().flush();
            let answer = self.read_answer().await?;
            if answer.is_empty() {
                return Some(default);
            }
            match answer.parse::<i64>() {
                Ok(number) => return Some(number),
                Err(_) => eprintln!("'{answer}' is not a whole number"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn empty_answer_takes_default() {
        let prompt = TerminalPrompt::new(&b"\n"[..]);
        assert_eq!(prompt.ask_integer("Season?", 4).await, Some(4));
    }

    #[tokio::test]
    async fn invalid_answers_are_asked_again() {
        let prompt = TerminalPrompt::new(&b"two\n 7 \n"[..]);
        assert_eq!(prompt.ask_integer("Episode?", 101).await, Some(7));
    }

    #[tokio::test]
    async fn closed_input_means_no_answer() {
        let prompt = TerminalPrompt::new(&b""[..]);
        assert_eq!(prompt.ask_integer("Season?", 0).await, None);
        let prompt = TerminalPrompt::new(&b"a\nb\nc\n9\n"[..]);
        assert_eq!(prompt.ask_integer("Season?", 0).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_question_does_not_hold_up_other_work() {
        let (mut keyboard, terminal) = tokio::io::duplex(64);
        let prompt = TerminalPrompt::new(BufReader::new(terminal));

        let interrupted = tokio::select! {
            _ = prompt.ask_integer("Season?", 0) => false,
            _ = tokio::time::sleep(Duration::from_secs(1)) => true,
        };
        assert!(interrupted);

        keyboard.write_all(b"5\n").await.unwrap();
        assert_eq!(prompt.ask_integer("Season?", 0).await, Some(5));
    }
}
