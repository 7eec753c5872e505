/*!

This is the long-form manual for `cycle_voting` and `cyclevote`.

## Cycles

A group runs numbered cycles, one after the other. Each cycle has four
instants: the start and end of the submission window, then the start and
end of the voting window. Windows are half-open, so a cycle is:

| phase        | when                                          |
|--------------|-----------------------------------------------|
| `pending`    | before `submissionStart`                      |
| `submission` | from `submissionStart` up to `submissionEnd`  |
| `voting`     | from `votingStart` up to `votingEnd`          |
| `completed`  | any other time after `submissionStart`        |

Cycles created by this crate have no gap between the two windows. A cycle
read from elsewhere may have one; the gap counts as `completed`.

The cadence of a group is given in days: `cadenceDays` for the whole cycle,
`votingDays` for the voting window. The submission window gets the rest and
must last at least one day.

## Ranking rules

The number of submissions a ballot may rank depends on how many
submissions the cycle received. A group defines tiers:

```text
minPapers  maxPapers  requiredRankings
1          3          1
4          (none)     3
```

The tier with the greatest `minPapers` among those containing the count is
used. A ballot ranks between 1 and `requiredRankings` submissions, each at
most once, with distinct positive ranks. Ranks may skip values: only their
order matters.

Tiers may not leave a hole: every count from the lowest `minPapers` upwards
must be covered, and the last tier must be unbounded. Two tiers may not start
at the same `minPapers`.

## Tally

The winner is computed with instant-runoff voting:
- a submission holding a strict majority of all the ballots wins
  (`floor(ballots / 2) + 1`, exhausted ballots included)
- otherwise the submission with the fewest votes is eliminated, the lowest
  identifier going first on a tie, and its ballots move on to their next
  choice still running
- if every submission left has the same count, the lowest identifier wins

Special cases: a cycle without submissions has no winner; a cycle with
submissions but no ballot is won by the lowest identifier; a single
submission always wins.

Each round records the votes of every running submission, and either the
winner or the eliminated submission along with the transfers of its
ballots and the number of ballots it exhausted.

## Rollover

A rollover pass for a group looks at its latest cycle. Once that cycle is
completed, the pass stores its result (if nobody did yet) and creates the
next cycle (if nobody did yet), starting exactly when the voting of the
previous one ended. A group that fell several cycles behind moves forward
one cycle per pass.

The pass may run from several places at once: a periodic job and a browser
session noticing the end of the vote, for example. The storage refuses a
second result for a cycle and a second cycle with the same number, and the
pass treats this refusal as success. The result is therefore written once
and the next cycle created once.

A group without any cycle is ignored: the first cycle is started by an
admin.

## Command line

`cyclevote rollover` runs passes over a state file, a JSON document with the
following sections (all optional):

```text
{
  "groups": [{"id": 1, "name": "...", "cadenceDays": 14, "votingDays": 3, "createdAt": "..."}],
  "rankingRules": {"1": [{"minPapers": 1, "maxPapers": null, "requiredRankings": 3}]},
  "participants": [...],
  "cycles": [...],
  "submissions": [...],
  "votes": [...],
  "cycleResults": [...]
}
```

The state is written back after each pass. The file is read at the start
of a pass and replaced at its end, so only one `cyclevote rollover` process
may work on a given state file at a time: two processes would overwrite each
other's passes. Nothing is lost for good, since the next pass redoes
whatever a lost one did, but a periodic driver and an ad-hoc `--group` run
should not share a file.

Options may also be given in a configuration file (`--config`):

```text
{
  "statePath": "state.json",
  "intervalSeconds": 60,
  "passes": 10,
  "groups": [1, 2]
}
```

Command line flags override the values of the configuration file. Without an
interval, a single pass is run.

`cyclevote tally` runs the tally alone on a file of the form:

```text
{
  "candidates": [1, 2, 3],
  "ballots": [[1, 2], [3], [2, 3, 1]]
}
```

 */
