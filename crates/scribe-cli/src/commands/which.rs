use scribe_interaction::BinaryResolver;

pub async fn run() {
    let resolver = BinaryResolver::new();
    let resolved = resolver.resolve().await;
    println!("{} ({:?})", resolved.path.display(), resolved.source);
    if !resolved.path.is_absolute() {
        eprintln!("not found in any known location; spawning will rely on PATH");
    }
}
