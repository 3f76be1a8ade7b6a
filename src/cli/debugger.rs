//! Interactive debugger shell
//!
//! Maps short commands onto the VM's inspection API and onto the
//! transactional layer: `poke` journals writes, `save` commits them and
//! `rollback` throws them away.
//!
//! Command arguments accept `r0`..`r7` (register contents), `pc`, `0x` hex,
//! `*` followed by a hex address (the word stored there), or decimal.

use colored::Colorize;
use log::debug;
use rustyline::error::ReadlineError;
use std::fs;
use std::io::Write;

use crate::cli::format::{hex_dump, listing};
use crate::cli::CliError;
use crate::storage::StorageError;
use crate::vm::{CharInput, Halt, MachineSnapshot, StepState, VM, Word, MAX_OPERAND};

/// Instructions shown by `disasm` when no count is given
const DEFAULT_LISTING: usize = 10;

const PROMPT: &str = "(sdb) ";

const HELP: &[&str] = &[
    "Available commands:",
    "  regs, r                 - Show registers and pc",
    "  step, s [n]             - Execute n instructions (default 1)",
    "  run, c                  - Run until the program halts",
    "  mem [addr [len]]        - Hex dump of committed memory",
    "  poke <addr> <value>...  - Journal writes starting at addr",
    "  save                    - Commit journaled writes",
    "  rollback                - Discard journaled writes",
    "  pending                 - List journaled writes",
    "  stack                   - Show the stack",
    "  disasm, d [addr [n]]    - Disassemble n instructions (default: pc, 10)",
    "  load <file> [base]      - Load an image file",
    "  dump <file>             - Save machine state as JSON",
    "  restore <file>          - Restore machine state from JSON",
    "  help                    - Show this help message",
    "  exit, quit              - Leave the debugger",
];

/// What the shell should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Lines to print
    Continue(Vec<String>),
    Quit,
}

/// Debugger session around one VM
pub struct Debugger<I, O>
where
    I: CharInput,
    O: Write,
{
    vm: VM<I, O>,
}

impl<I, O> Debugger<I, O>
where
    I: CharInput,
    O: Write,
{
    pub fn new(vm: VM<I, O>) -> Self {
        Self { vm }
    }

    pub fn vm(&self) -> &VM<I, O> {
        &self.vm
    }

    pub fn vm_mut(&mut self) -> &mut VM<I, O> {
        &mut self.vm
    }

    /// Read-eval-print loop on the terminal
    pub fn run(&mut self) -> Result<(), CliError> {
        let mut rl = rustyline::DefaultEditor::new()?;

        loop {
            let line = match rl.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => {
                    println!("Interrupted (Ctrl+C)");
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            rl.add_history_entry(trimmed)?;

            match self.execute_command(trimmed) {
                Ok(CommandOutcome::Continue(lines)) => {
                    for line in lines {
                        println!("{}", line);
                    }
                }
                Ok(CommandOutcome::Quit) => break,
                Err(e) => println!("{} {}", "error:".red().bold(), e),
            }
        }

        if self.vm.memory().has_pending() {
            println!("{}", "Discarding uncommitted pokes".yellow());
        }
        Ok(())
    }

    /// Run one command line
    pub fn execute_command(&mut self, line: &str) -> Result<CommandOutcome, CliError> {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some(command) => command,
            None => return Ok(CommandOutcome::Continue(Vec::new())),
        };
        let args: Vec<&str> = words.collect();
        debug!("debugger command {} {:?}", command, args);

        let lines = match command {
            "regs" | "r" => self.regs(),
            "step" | "s" => self.step(&args)?,
            "run" | "c" => self.run_to_halt()?,
            "mem" => self.mem(&args)?,
            "poke" => self.poke(&args)?,
            "save" => self.save()?,
            "rollback" => self.rollback(),
            "pending" => self.pending(),
            "stack" => self.stack(),
            "disasm" | "d" => self.disasm(&args)?,
            "load" => self.load(&args)?,
            "dump" => self.dump(&args)?,
            "restore" => self.restore(&args)?,
            "help" => HELP.iter().map(|s| s.to_string()).collect(),
            "exit" | "quit" => return Ok(CommandOutcome::Quit),
            other => return Err(format!("Unknown command '{}'; try 'help'", other).into()),
        };
        Ok(CommandOutcome::Continue(lines))
    }

    /// Convert one command argument to a word
    pub fn convert(&self, arg: &str) -> Result<Word, CliError> {
        if let Some(index) = arg.strip_prefix('r').and_then(|n| n.parse::<usize>().ok()) {
            let (_, value) = self
                .vm
                .regs()
                .into_iter()
                .nth(index)
                .ok_or_else(|| format!("No register r{}", index))?;
            return Ok(value);
        }
        if arg == "pc" {
            return Ok(self.vm.pc());
        }
        if let Some(hex) = arg.strip_prefix("0x") {
            return Word::from_str_radix(hex, 16).map_err(|_| format!("Bad hex value '{}'", arg).into());
        }
        if let Some(hex) = arg.strip_prefix('*') {
            let address = usize::from_str_radix(hex, 16).map_err(|_| format!("Bad address '{}'", arg))?;
            return Ok(self.vm.memory().read(address)?);
        }
        arg.parse::<Word>().map_err(|_| format!("Cannot interpret '{}'", arg).into())
    }

    fn arg_or(&self, args: &[&str], index: usize, default: usize) -> Result<usize, CliError> {
        match args.get(index) {
            Some(arg) => Ok(self.convert(arg)? as usize),
            None => Ok(default),
        }
    }

    fn regs(&self) -> Vec<String> {
        let mut lines = vec!["Register Contents".to_string(), "-----------------".to_string()];
        for (name, value) in self.vm.regs() {
            lines.push(format!("  {}: {} ({:04X}h)", name, value, value));
        }
        let pc = self.vm.pc();
        lines.push(format!("  pc: {} ({:04X}h)", pc, pc));
        lines
    }

    fn step(&mut self, args: &[&str]) -> Result<Vec<String>, CliError> {
        let count = self.arg_or(args, 0, 1)?;
        let mut lines = Vec::new();
        for _ in 0..count {
            let address = self.vm.pc();
            if let StepState::Halted(reason) = self.vm.step()? {
                lines.push(halted(&Halt { address, reason }));
                break;
            }
        }
        self.vm.output_mut().flush()?;
        lines.extend(self.next_instruction());
        Ok(lines)
    }

    fn run_to_halt(&mut self) -> Result<Vec<String>, CliError> {
        let halt = self.vm.execute()?;
        Ok(vec![halted(&halt)])
    }

    fn stack(&self) -> Vec<String> {
        let items: Vec<String> = self.vm.stack().iter().map(|v| v.to_string()).collect();
        vec![format!("Stack: [{}]", items.join(", "))]
    }

    fn mem(&self, args: &[&str]) -> Result<Vec<String>, CliError> {
        let address = self.arg_or(args, 0, 0)?;
        let length = match args.get(1) {
            Some(arg) => Some(self.convert(arg)? as usize),
            None => None,
        };
        Ok(hex_dump(address, &self.vm.memory_view(address, length)))
    }

    fn poke(&mut self, args: &[&str]) -> Result<Vec<String>, CliError> {
        if args.len() < 2 {
            return Err("Usage: poke <addr> <value>...".into());
        }
        let address = self.convert(args[0])? as usize;
        let values = args[1..]
            .iter()
            .map(|arg| self.convert(arg))
            .collect::<Result<Vec<_>, _>>()?;

        // Validate the whole poke first so a failure journals nothing
        let memory = self.vm.memory_mut();
        let last = address + values.len() - 1;
        if last >= memory.size() {
            return Err(StorageError::InvalidAddress { address: last, size: memory.size() }.into());
        }
        if let Some(value) = values.iter().find(|value| **value > MAX_OPERAND) {
            return Err(StorageError::InvalidValue { value: *value }.into());
        }
        for (offset, value) in values.iter().enumerate() {
            memory.write(address + offset, *value)?;
        }
        Ok(vec![format!(
            "Poked {} word(s) at {:04X}h (pending; 'save' to commit)",
            values.len(),
            address
        )])
    }

    fn save(&mut self) -> Result<Vec<String>, CliError> {
        let count = self.vm.memory().journal().len();
        self.vm.memory_mut().commit()?;
        Ok(vec![format!("Committed {} write(s)", count)])
    }

    fn rollback(&mut self) -> Vec<String> {
        let count = self.vm.memory().journal().len();
        self.vm.memory_mut().rollback();
        vec![format!("Rolled back {} write(s)", count)]
    }

    fn pending(&self) -> Vec<String> {
        let journal = self.vm.memory().journal();
        if journal.is_empty() {
            return vec!["No pending writes".to_string()];
        }
        journal
            .iter()
            .map(|entry| format!("  {:04X}h: {:04X} -> {:04X}", entry.address, entry.snapshot, entry.value))
            .collect()
    }

    fn disasm(&self, args: &[&str]) -> Result<Vec<String>, CliError> {
        let address = self.arg_or(args, 0, self.vm.pc() as usize)?;
        let count = self.arg_or(args, 1, DEFAULT_LISTING)?;
        Ok(listing(address, &self.vm.memory_view(address, None), count))
    }

    fn load(&mut self, args: &[&str]) -> Result<Vec<String>, CliError> {
        let path = args.first().ok_or("Usage: load <file> [base]")?;
        let base = self.arg_or(args, 1, self.vm.config().load_base as usize)?;
        let image = fs::read(path)?;
        let words = self.vm.load_image(&image, base)?;
        Ok(vec![format!("Loaded {} words at {:04X}h", words, base)])
    }

    fn dump(&self, args: &[&str]) -> Result<Vec<String>, CliError> {
        let path = args.first().ok_or("Usage: dump <file>")?;
        fs::write(path, self.vm.snapshot().to_json()?)?;
        Ok(vec![format!("Machine state written to {}", path)])
    }

    fn restore(&mut self, args: &[&str]) -> Result<Vec<String>, CliError> {
        let path = args.first().ok_or("Usage: restore <file>")?;
        let snapshot = MachineSnapshot::from_json(&fs::read_to_string(path)?)?;
        self.vm.restore(snapshot)?;
        Ok(vec![format!("Machine state restored from {}", path)])
    }

    fn next_instruction(&self) -> Vec<String> {
        let pc = self.vm.pc() as usize;
        listing(pc, &self.vm.memory_view(pc, None), 1)
            .into_iter()
            .map(|line| format!("-> {}", line))
            .collect()
    }
}

/// The halt banner
pub fn halted(halt: &Halt) -> String {
    format!(
        "HALTED: stopped at address {} ({:04X}): {}",
        halt.address, halt.address, halt.reason
    )
}
