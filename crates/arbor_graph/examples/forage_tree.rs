//! Example: Build, run and round-trip a foraging behaviour tree
//!
//! Usage: cargo run --example forage_tree

use std::sync::Arc;

use arbor_graph::{
    standard_registry, ActionNode, ActionTask, Agent, ConditionNode, ConditionTask, ExecContext,
    Graph, GraphError, GraphKind, GraphRunner, Outcome, Selector, Sequencer,
};
use arbor_serial::{reflect_struct, Serializer, TypeSchema};

#[derive(Debug, Default)]
struct HasDaylight;

reflect_struct!(HasDaylight);

impl ConditionTask for HasDaylight {
    fn on_check(&mut self, cx: &mut ExecContext<'_>) -> bool {
        cx.blackboard.get_bool("daylight").unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct GatherBerries {
    target: f64,
}

reflect_struct!(GatherBerries);

impl ActionTask for GatherBerries {
    fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
        self.on_update(cx);
    }

    fn on_update(&mut self, cx: &mut ExecContext<'_>) {
        let berries = cx.blackboard.get_number("berries").unwrap_or(0.0) + 1.0;
        cx.blackboard.set("berries", berries);
        println!("  gathering... {} of {}", berries, self.target);
        if berries >= self.target {
            cx.end_action(Outcome::Success);
        }
    }
}

#[derive(Debug, Default)]
struct Nap {
    seconds: f64,
    slept: f64,
}

reflect_struct!(Nap);

impl ActionTask for Nap {
    fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
        self.slept = 0.0;
        self.on_update(cx);
    }

    fn on_update(&mut self, cx: &mut ExecContext<'_>) {
        self.slept += cx.dt;
        println!("  napping... {:.1}s of {:.1}s", self.slept, self.seconds);
        if self.slept >= self.seconds {
            cx.end_action(Outcome::Success);
        }
    }
}

fn build_tree() -> Result<Graph, GraphError> {
    let mut graph = Graph::behaviour_tree();
    graph.settings.repeat = false;

    let root = graph.add_node(Box::new(Selector::default()));
    let forage = graph.add_node(Box::new(Sequencer::default()));
    let mut daylight = ConditionNode::default();
    daylight.conditions.push(Box::new(HasDaylight));
    let check = graph.add_node(Box::new(daylight));
    let mut gather = ActionNode::default();
    gather.actions.push(Box::new(GatherBerries { target: 3.0 }));
    let berries = graph.add_node(Box::new(gather));
    let mut nap = ActionNode::default();
    nap.actions.push(Box::new(Nap {
        seconds: 1.0,
        ..Nap::default()
    }));
    let rest = graph.add_node(Box::new(nap));

    graph.connect(root, forage)?;
    graph.connect(root, rest)?;
    graph.connect(forage, check)?;
    graph.connect(forage, berries)?;
    Ok(graph)
}

fn run_to_end(runner: &mut GraphRunner, label: &str) -> Result<(), GraphError> {
    println!("{label}");
    println!("─────────────────────────────────────────────────");
    runner.start(Agent::named("badger"))?;
    let mut frames = 0;
    while runner.is_running() && frames < 20 {
        runner.update(0.5);
        frames += 1;
    }
    println!();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("info,arbor_graph=debug")
        .init();

    println!("Arbor Forage Tree");
    println!("=================\n");

    // Registry with built-ins plus this example's tasks
    let registry = standard_registry();
    registry.register::<HasDaylight>(TypeSchema::builder::<HasDaylight>("HasDaylight").finish());
    registry.register_poly::<dyn ConditionTask>(|| Box::new(HasDaylight));
    registry.register::<GatherBerries>(
        TypeSchema::builder::<GatherBerries>("GatherBerries")
            .with_field(
                "target",
                |g: &GatherBerries| &g.target,
                |g: &mut GatherBerries| &mut g.target,
            )
            .finish(),
    );
    registry.register_poly::<dyn ActionTask>(|| Box::new(GatherBerries::default()));
    registry.register::<Nap>(
        TypeSchema::builder::<Nap>("Nap")
            .with_field("seconds", |n: &Nap| &n.seconds, |n: &mut Nap| {
                &mut n.seconds
            })
            .finish(),
    );
    registry.register_poly::<dyn ActionTask>(|| Box::new(Nap::default()));
    let serializer = Arc::new(Serializer::new(registry));

    let mut graph = build_tree()?;
    println!(
        "Built tree: {} nodes, {} connections\n",
        graph.node_count(),
        graph.connection_count()
    );

    // Daytime: the forage branch wins.
    let mut runner = GraphRunner::new(graph.duplicate(&serializer)?.0);
    runner.set_on_finished(|status| println!("✓ Tree finished: {status}"));
    runner.blackboard_mut().set("daylight", true);
    run_to_end(&mut runner, "Run 1: daylight (forage branch)")?;

    // Night: the selector falls through to the nap.
    let mut runner = GraphRunner::new(graph.duplicate(&serializer)?.0);
    runner.set_on_finished(|status| println!("✓ Tree finished: {status}"));
    runner.blackboard_mut().set("daylight", false);
    run_to_end(&mut runner, "Run 2: night (nap branch)")?;

    // The whole tree serializes, payloads included.
    let saved = graph.save(&serializer)?;
    println!("Saved tree ({} bytes):", saved.json.len());
    println!("{}\n", saved.json);

    let (loaded, notes) =
        Graph::load(&serializer, GraphKind::BehaviourTree, &saved.json, &saved.refs)?;
    println!(
        "Loaded back: {} nodes, notes: {}",
        loaded.node_count(),
        notes
    );

    println!("Done!");
    Ok(())
}
