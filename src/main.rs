fn main() -> anyhow::Result<()> {
    pomodoro_timer::run()
}
