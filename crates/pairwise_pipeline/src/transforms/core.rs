use anyhow::{Context, Result};
use std::marker::PhantomData;

/// A stateless conversion step in an image-preparation pipeline.
///
/// `Transform<I, O>` turns an `I` into an `O`. Steps compose with
/// `.then(...)` into a single inlined pipeline, e.g.
/// `LoadImage -> EnsureRgb -> Resize -> ToArray -> Normalize`.
///
/// `then()` requires:
/// 1. **Types align**: `self: Transform<I, O>`, `next: Transform<O, M>`
/// 2. **Owned**: `Self: Sized`
/// 3. **Thread-safe**: intermediate and output types are `Send`, so a
///    pipeline can be shared by every loader worker.
pub trait Transform<I, O>: Send + Sync {
    fn apply(&self, input: I) -> Result<O>;

    #[inline]
    fn then<T, M>(self, next: T) -> Chain<Self, T, O>
    where
        Self: Sized,
        T: Transform<O, M>,
        O: Send,
        M: Send,
    {
        Chain::new(self, next)
    }
}

/// Two transforms run back to back (`A` then `B`).
/// `PhantomData<M>` pins the intermediate type.
#[derive(Debug)]
pub struct Chain<A, B, M> {
    first: A,
    second: B,
    _marker: PhantomData<fn() -> M>,
}

impl<A, B, M> Chain<A, B, M> {
    pub fn new(first: A, second: B) -> Self {
        Self {
            first,
            second,
            _marker: PhantomData,
        }
    }
}

impl<I, M, O, A, B> Transform<I, O> for Chain<A, B, M>
where
    A: Transform<I, M>,
    B: Transform<M, O>,
    M: Send,
{
    fn apply(&self, input: I) -> Result<O> {
        self.first
            .apply(input)
            .and_then(|mid| self.second.apply(mid))
            .with_context(|| {
                format!(
                    "Transform chain failed: {} → {}",
                    std::any::type_name::<A>(),
                    std::any::type_name::<B>()
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct Double;
    impl Transform<u8, u16> for Double {
        fn apply(&self, input: u8) -> Result<u16> {
            Ok(input as u16 * 2)
        }
    }

    struct Centre;
    impl Transform<u16, f32> for Centre {
        fn apply(&self, input: u16) -> Result<f32> {
            Ok(input as f32 - 255.0)
        }
    }

    #[test]
    fn test_then_composes_in_order() -> Result<()> {
        let pipeline = Double.then(Centre);
        assert_eq!(pipeline.apply(200)?, 145.0);
        Ok(())
    }

    #[test]
    fn test_chain_error_names_both_steps() {
        struct Reject;
        impl Transform<u16, f32> for Reject {
            fn apply(&self, _: u16) -> Result<f32> {
                Err(anyhow!("rejected"))
            }
        }

        let err = Double.then(Reject).apply(1).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Transform chain failed"));
        assert!(msg.contains("Double"));
        assert!(msg.contains("Reject"));
    }
}
