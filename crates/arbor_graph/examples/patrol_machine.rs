//! Example: Drive a patrol state machine with stacked transitions
//!
//! Usage: cargo run --example patrol_machine

use std::sync::Arc;

use arbor_graph::{
    standard_registry, ActionTask, Agent, AnyState, Blackboard, CallMode, ConditionTask,
    ExecContext, Graph, Outcome, StateNode,
};
use arbor_serial::{reflect_struct, Serializer, TypeSchema};

#[derive(Debug, Default)]
struct Walk {
    name: String,
    steps: u32,
    taken: u32,
}

reflect_struct!(Walk);

impl ActionTask for Walk {
    fn on_execute(&mut self, cx: &mut ExecContext<'_>) {
        self.taken = 0;
        self.on_update(cx);
    }

    fn on_update(&mut self, cx: &mut ExecContext<'_>) {
        self.taken += 1;
        println!("  [{}] step {} of {}", self.name, self.taken, self.steps);
        if self.taken >= self.steps {
            cx.end_action(Outcome::Success);
        }
    }
}

#[derive(Debug, Default)]
struct Flag {
    key: String,
}

reflect_struct!(Flag);

impl ConditionTask for Flag {
    fn on_check(&mut self, cx: &mut ExecContext<'_>) -> bool {
        cx.blackboard.get_bool(&self.key).unwrap_or(false)
    }
}

fn state(name: &str, steps: u32) -> Box<StateNode> {
    let mut node = StateNode::default();
    node.actions.push(Box::new(Walk {
        name: name.to_string(),
        steps,
        ..Walk::default()
    }));
    Box::new(node)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter("info,arbor_graph=debug")
        .init();

    println!("Arbor Patrol Machine");
    println!("====================\n");

    let registry = standard_registry();
    registry.register::<Walk>(
        TypeSchema::builder::<Walk>("Walk")
            .with_field("name", |w: &Walk| &w.name, |w: &mut Walk| &mut w.name)
            .with_field("steps", |w: &Walk| &w.steps, |w: &mut Walk| &mut w.steps)
            .finish(),
    );
    registry.register_poly::<dyn ActionTask>(|| Box::new(Walk::default()));
    registry.register::<Flag>(
        TypeSchema::builder::<Flag>("Flag")
            .with_field("key", |f: &Flag| &f.key, |f: &mut Flag| &mut f.key)
            .finish(),
    );
    registry.register_poly::<dyn ConditionTask>(|| Box::new(Flag::default()));
    let serializer = Arc::new(Serializer::new(registry));

    // Patrol loops until something fires; Investigate suspends it and hands
    // control back afterwards; the watcher sends everything to Retreat.
    let mut graph = Graph::state_machine();
    let patrol = graph.add_node(state("patrol", 99));
    let investigate = graph.add_node(state("investigate", 2));
    let retreat = graph.add_node(state("retreat", 1));
    let watcher = graph.add_node(Box::new(AnyState));

    let noise = graph.connect(patrol, investigate)?;
    if let Some(conn) = graph.connection_mut(noise) {
        conn.call_mode = CallMode::Stacked;
        conn.set_guard(Box::new(Flag {
            key: "heard_noise".into(),
        }));
    }
    let danger = graph.connect(watcher, retreat)?;
    if let Some(conn) = graph.connection_mut(danger) {
        conn.call_mode = CallMode::Clean;
        conn.set_guard(Box::new(Flag {
            key: "danger".into(),
        }));
    }

    println!(
        "Built machine: {} states, {} transitions\n",
        graph.node_count(),
        graph.connection_count()
    );

    let mut board = Blackboard::new();
    let names = ["patrol", "investigate", "retreat", "watcher"];
    let current = |graph: &Graph| graph.current_state().map(|i| names[i]).unwrap_or("-");

    graph.start(Agent::named("sentry"), &mut board)?;
    println!("Frame 0: current = {}", current(&graph));

    // Quiet patrol.
    for frame in 1..=2 {
        graph.update(0.5, &mut board);
        println!("Frame {frame}: current = {}", current(&graph));
    }

    // A noise interrupts: patrol is suspended, not reset.
    println!("\n! noise heard");
    board.set("heard_noise", true);
    graph.update(0.5, &mut board);
    board.set("heard_noise", false);
    println!("Frame 3: current = {} (stack depth {})", current(&graph), graph.resume_depth());

    // Investigation ends; patrol resumes where it left off.
    graph.update(0.5, &mut board);
    graph.update(0.5, &mut board);
    println!("Frame 5: current = {} (stack depth {})", current(&graph), graph.resume_depth());

    // Danger fires the watcher transition from anywhere.
    println!("\n! danger spotted");
    board.set("danger", true);
    graph.update(0.5, &mut board);
    println!("Frame 6: current = {}", current(&graph));
    board.set("danger", false);

    // Retreat has no outgoing transitions, so the machine finishes.
    graph.update(0.5, &mut board);
    match graph.take_finished() {
        Some(status) => println!("\n✓ Machine finished: {status}"),
        None => println!("\n✗ Machine still running"),
    }

    // The machine round-trips through JSON, guards and call modes included.
    let saved = graph.save(&serializer)?;
    println!("\nSaved machine ({} bytes)", saved.json.len());

    println!("Done!");
    Ok(())
}
