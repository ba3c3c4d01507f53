//! 체험용 데모 문서

use crate::knowledge::{NewDocument, SourceKind};

/// 데모 문서 제목
pub const DEMO_TITLE: &str = "The Tortoise and the Hare";

/// 데모 문서 본문 (이솝 우화)
pub const DEMO_TEXT: &str = r#"The Tortoise and the Hare (from Aesop's Fables)

The Story

One sunny day in the forest, a fast and boastful hare was bragging loudly about how quick he was.

"I'm the fastest creature alive!" he laughed. "No one can beat me in a race!"

The other animals grew tired of his constant boasting. Then, quietly, a slow and gentle tortoise spoke up:

"I will race you."

The forest went silent. Then the hare burst into laughter.

"You?" he said. "That's the funniest thing I've ever heard. I could run circles around you before you take three steps!"

But the tortoise simply said, "Let's find out."

So the animals marked a starting line and a finish line. At the signal, the race began.

The hare shot forward like a bolt of lightning and was soon far out of sight. The tortoise, meanwhile, moved slowly and steadily, step by step, never stopping.

After a while, the hare looked back and saw the tortoise far behind.

"You know what?" he said to himself. "I have plenty of time. I'll take a little nap."

So he lay down under a shady tree and quickly fell asleep.

The tortoise passed the sleeping hare. Still walking. Still steady. Never stopping.

Minutes passed. Then hours.

At last, the hare woke up and stretched.

"Oh! I should finish the race now," he said confidently.

He ran as fast as he could toward the finish line, but it was too late.

The tortoise was already crossing the line.

The animals cheered. The hare stood in shock. And the tortoise simply smiled.

The Moral

Slow and steady wins the race."#;

/// 데모 문서 (붙여넣은 텍스트로 취급)
pub fn demo_document() -> NewDocument {
    NewDocument::new(DEMO_TITLE, SourceKind::Clipboard, DEMO_TEXT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::default_chunker;

    #[test]
    fn test_demo_document_chunks() {
        let document = demo_document();
        assert_eq!(document.display_name, DEMO_TITLE);

        let chunks = default_chunker().chunk(&document.raw_text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().any(|c| c.contains("Slow and steady wins the race.")));
    }
}
