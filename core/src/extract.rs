use crate::config::GramSize;
use crate::error::Result;
use crate::gram::Window;

/// Emits every window of `size` terms whose consecutive members are at most
/// `max_jump` positions apart (a jump of 1 means adjacent).
///
/// Windows come out ordered by start position, then by first jump, then by
/// second jump. Each valid window is emitted exactly once.
pub fn extract<T: Copy>(tokens: &[T], size: usize, max_jump: usize) -> Result<Vec<Window<T>>> {
    let size = GramSize::try_from(size)?;
    Ok(extract_sized(tokens, size, max_jump))
}

pub fn extract_sized<T: Copy>(tokens: &[T], size: GramSize, max_jump: usize) -> Vec<Window<T>> {
    let n = tokens.len();
    let span = max_jump + 1;
    let mut out = Vec::new();
    match size {
        GramSize::Unigram => {
            out.extend(tokens.iter().map(|&t| Window::Unigram(t)));
        }
        GramSize::Bigram => {
            for i in 0..n.saturating_sub(1) {
                for j in (1..=span).take_while(|j| i + j < n) {
                    out.push(Window::Bigram(tokens[i], tokens[i + j], Some(jump(j))));
                }
            }
        }
        GramSize::Trigram => {
            for i in 0..n.saturating_sub(2) {
                for j in (1..=span).take_while(|j| i + j + 1 < n) {
                    for k in (1..=span).take_while(|k| i + j + k < n) {
                        out.push(Window::Trigram(
                            tokens[i],
                            tokens[i + j],
                            tokens[i + j + k],
                            Some(jump(j)),
                            Some(jump(k)),
                        ));
                    }
                }
            }
        }
    }
    out
}

// Distances are bounded by MAX_JUMP + 1, so they always fit.
fn jump(distance: usize) -> i8 {
    i8::try_from(distance).unwrap_or(i8::MAX)
}
