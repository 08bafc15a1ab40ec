use std::io::Write;

use anyhow::Result;
use fiber_trace_core::model::{Commit, CommitStore, TreeNode};
use fiber_trace_protocol::{FiberEvent, FiberId, Message};

pub fn write_summary(out: &mut impl Write, store: &CommitStore, rejected: usize) -> Result<()> {
    let live = store.fibers().filter(|f| !f.is_unmounted).count();
    writeln!(
        out,
        "{} fibers ({live} live), {} commits, {} events",
        store.len(),
        store.commits().len(),
        store.events().len()
    )?;
    if rejected > 0 {
        writeln!(out, "{rejected} batches rejected")?;
    }
    Ok(())
}

pub fn write_commits(out: &mut impl Write, commits: &[Commit]) -> Result<()> {
    for commit in commits {
        let stats = commit.stats();
        let duration = commit
            .duration()
            .map_or_else(|| "-".to_string(), |d| format!("{d:.2}ms"));
        let trigger = stats
            .trigger
            .as_ref()
            .map_or_else(|| "-".to_string(), |t| format!("{} ({})", t.event, t.kind));
        writeln!(
            out,
            "commit {:<4} {:>3} events  {duration:>9}  {trigger}",
            commit.commit_id,
            stats.total()
        )?;

        let counts: Vec<String> = stats
            .counts
            .iter()
            .map(|(op, count)| format!("{op} {count}"))
            .collect();
        writeln!(out, "  {}", counts.join(", "))?;
    }
    Ok(())
}

pub fn write_fiber(out: &mut impl Write, store: &CommitStore, id: FiberId) -> Result<()> {
    let fiber = store.fiber(id)?;
    let status = if fiber.is_unmounted { "unmounted" } else { "live" };
    writeln!(out, "{} #{} ({status})", fiber.display_name, fiber.id)?;
    if let Some(key) = &fiber.key {
        writeln!(out, "  key      {key}")?;
    }
    writeln!(out, "  depth    {}", fiber.depth)?;
    writeln!(out, "  parent   {}", describe(store, fiber.parent_id))?;
    writeln!(out, "  owner    {}", describe(store, fiber.owner_id))?;
    if !fiber.children.is_empty() {
        let children: Vec<String> = fiber.children.iter().map(ToString::to_string).collect();
        writeln!(out, "  children {}", children.join(" "))?;
    }
    if let Some(mean) = fiber.timings.mean_duration() {
        writeln!(
            out,
            "  renders  {} (mean {mean:.2}ms, self {:.2}ms total)",
            fiber.timings.render_count(),
            fiber.timings.total_self_duration
        )?;
    }

    writeln!(out, "  history")?;
    for message in store.fiber_events(id)? {
        writeln!(out, "    {}", describe_event(message))?;
    }
    Ok(())
}

fn describe(store: &CommitStore, id: Option<FiberId>) -> String {
    match id {
        None => "-".to_string(),
        Some(id) => match store.fiber(id) {
            Ok(fiber) => format!("{} #{id}", fiber.display_name),
            Err(_) => format!("#{id}"),
        },
    }
}

fn describe_event(message: &Message) -> String {
    let commit = message
        .commit_id
        .map_or_else(|| "-".to_string(), |c| c.to_string());
    let detail = match &message.event {
        FiberEvent::EffectTrigger { effect } => format!(" {effect}"),
        FiberEvent::OwnershipChange { owner_id: Some(owner) } => format!(" -> #{owner}"),
        FiberEvent::Update { changes } => changes
            .duration
            .map(|d| format!(" {d:.2}ms"))
            .unwrap_or_default(),
        _ => String::new(),
    };
    format!("#{:<5} commit {commit:<4} {}{detail}", message.id, message.op())
}

pub fn write_tree(out: &mut impl Write, nodes: &[TreeNode]) -> Result<()> {
    for node in nodes {
        write_node(out, node, 0)?;
    }
    Ok(())
}

fn write_node(out: &mut impl Write, node: &TreeNode, indent: usize) -> Result<()> {
    let marker = if node.is_unmounted { " (unmounted)" } else { "" };
    writeln!(
        out,
        "{:indent$}{} #{}{marker}",
        "",
        node.display_name,
        node.id,
        indent = indent * 2
    )?;
    for child in &node.children {
        write_node(out, child, indent + 1)?;
    }
    Ok(())
}
