/// Run `handle` then `apply` for every emitted event, without persistence.
///
/// Used by unit tests and by code that needs to preview the outcome of a
/// command. Production writes go through the infra `CommandDispatcher`.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: tradeflow_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
