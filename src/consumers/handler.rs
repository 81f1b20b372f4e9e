//! The `Handler` trait is heavily inspired by `tide`'s approach to endpoint handlers.
use crate::consumers::Delivery;
use std::future::Future;

/// Implementers of the `Handler` trait process the messages pulled by a subscription's
/// workers, one delivery at a time per worker.
///
/// # Scope
///
/// The handler decides the fate of each delivery: it must [`ack`](Delivery::ack),
/// [`nack`](Delivery::nack) or [`reject`](Delivery::reject) it.
/// If the handler panics the delivery is nacked without requeue, so a message that keeps
/// crashing the handler is not redelivered forever. The worker keeps running.
///
/// # Implementers
///
/// While you can implement `Handler` for a struct or enum, most of the time an async function
/// wrapped in [`ClosureHandler`] does the job:
///
/// ```rust
/// use hutch::consumers::{ClosureHandler, Delivery};
///
/// async fn print_and_ack(delivery: &Delivery) {
///     println!("{}", String::from_utf8_lossy(&delivery.data));
///     let _ = delivery.ack().await;
/// }
///
/// let handler = ClosureHandler(print_and_ack);
/// # drop(handler);
/// ```
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery);
}

/// Implement the [`Handler`] trait for all Boxed handlers.
#[async_trait::async_trait]
impl<H> Handler for Box<H>
where
    H: Handler + ?Sized,
{
    async fn handle(&self, delivery: &Delivery) {
        H::handle(self, delivery).await
    }
}

/// `AsyncClosure` is implemented for all functions of the form:
/// ```ignore
/// async fn(delivery: &Delivery);
/// ```
///
/// When combined with the [`ClosureHandler`] type, you get a [`Handler`].
pub trait AsyncClosure<'a>: Send + Sync + 'static {
    type Output: Future<Output = ()> + Send + 'a;
    fn call(&'a self, delivery: &'a Delivery) -> Self::Output;
}

impl<'a, F, Fut> AsyncClosure<'a> for F
where
    F: Send + Sync + 'static,
    F: Fn(&'a Delivery) -> Fut,
    Fut: Future<Output = ()> + Send + 'a,
{
    type Output = Fut;

    fn call(&'a self, delivery: &'a Delivery) -> Self::Output {
        (self)(delivery)
    }
}

/// Wrapper type to turn an [`AsyncClosure`] into a [`Handler`].
pub struct ClosureHandler<F>(pub F);

#[async_trait::async_trait]
impl<F> Handler for ClosureHandler<F>
where
    F: for<'a> AsyncClosure<'a>,
{
    async fn handle(&self, delivery: &Delivery) {
        self.0.call(delivery).await
    }
}
