use std::io::{self, BufRead, Write};

/// Ask a yes/no question; anything but "y" or "yes" (or end of input) is a no.
pub fn confirm<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "{} (y/n): ", question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(answer: &str) -> bool {
        let mut output = Vec::new();
        confirm("Update rows?", &mut answer.as_bytes(), &mut output).unwrap()
    }

    #[test]
    fn accepts_yes_answers() {
        assert!(ask("y\n"));
        assert!(ask("YES\n"));
        assert!(ask("  yes  \n"));
    }

    #[test]
    fn everything_else_is_no() {
        assert!(!ask("n\n"));
        assert!(!ask("sure\n"));
        assert!(!ask(""));
    }

    #[test]
    fn question_is_written_before_reading() {
        let mut output = Vec::new();
        confirm("Update 3 rows?", &mut "n\n".as_bytes(), &mut output).unwrap();
        assert_eq!(String::from_utf8(output).unwrap(), "Update 3 rows? (y/n): ");
    }
}
