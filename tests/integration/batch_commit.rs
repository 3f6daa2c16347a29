use litflow::services::BatchExecutor;
use std::collections::HashSet;

#[derive(Debug)]
enum Outcome {
    Scored(u32, f64),
    Defaulted(u32),
}

/// A failing worker call is converted to a safe default outcome by the
/// worker itself; the executor must still deliver exactly one outcome per
/// item with no gaps or duplicates.
#[test]
fn one_failing_worker_still_yields_every_outcome() {
    let executor = BatchExecutor::new(4);
    let items: Vec<u32> = (0..16).collect();

    let mut last_progress = 0;
    let outcomes = executor
        .run(
            items,
            |item| {
                if item == 7 {
                    Outcome::Defaulted(item)
                } else {
                    Outcome::Scored(item, f64::from(item) * 1.5)
                }
            },
            |done, total| {
                assert_eq!(total, 16);
                last_progress = done;
            },
        )
        .unwrap();

    assert_eq!(outcomes.len(), 16);
    assert_eq!(last_progress, 16);

    let ids: HashSet<u32> = outcomes
        .iter()
        .map(|o| match o {
            Outcome::Scored(id, _) | Outcome::Defaulted(id) => *id,
        })
        .collect();
    assert_eq!(ids.len(), 16, "no missing or duplicate outcomes");
    assert!(matches!(
        outcomes.iter().find(|o| matches!(o, Outcome::Defaulted(_))),
        Some(Outcome::Defaulted(7))
    ));
}

#[test]
fn empty_input_completes_without_progress() {
    let executor = BatchExecutor::new(8);
    let outcomes = executor
        .run(Vec::<u32>::new(), |n| n, |_, _| panic!("no progress expected"))
        .unwrap();
    assert!(outcomes.is_empty());
}
