#[cfg(test)]
#[path = "slash_commands_test.rs"]
mod tests;

pub struct SlashCommand {
    command: String,
    pub args: Vec<String>,
}

impl SlashCommand {
    pub fn parse(text: &str) -> Option<SlashCommand> {
        let mut args = text
            .trim()
            .split(' ')
            .filter(|e| return !e.is_empty())
            .map(|e| return e.to_string())
            .collect::<Vec<String>>();
        if args.is_empty() {
            return None;
        }
        let prefix = args.remove(0);

        let cmd = SlashCommand {
            command: prefix,
            args,
        };
        if cmd.is_quit()
            || cmd.is_help()
            || cmd.is_evaluate()
            || cmd.is_cancel()
            || cmd.is_project()
            || cmd.is_key()
            || cmd.is_reload()
            || cmd.is_diagram()
        {
            return Some(cmd);
        }

        return None;
    }

    /// Everything after the command, joined back together.
    pub fn rest(&self) -> String {
        return self.args.join(" ");
    }

    pub fn is_quit(&self) -> bool {
        return ["/q", "/quit", "/exit"].contains(&self.command.as_str());
    }

    pub fn is_help(&self) -> bool {
        return ["/h", "/help"].contains(&self.command.as_str());
    }

    pub fn is_evaluate(&self) -> bool {
        return ["/ev", "/evaluate"].contains(&self.command.as_str());
    }

    pub fn is_cancel(&self) -> bool {
        return ["/c", "/cancel"].contains(&self.command.as_str());
    }

    pub fn is_project(&self) -> bool {
        return ["/p", "/project"].contains(&self.command.as_str());
    }

    pub fn is_key(&self) -> bool {
        return self.command == "/key";
    }

    pub fn is_reload(&self) -> bool {
        return ["/r", "/reload"].contains(&self.command.as_str());
    }

    pub fn is_diagram(&self) -> bool {
        return ["/d", "/diagram"].contains(&self.command.as_str());
    }
}
