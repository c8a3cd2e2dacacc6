/*!

This is the long-form manual for `election_reconcile` and `valgrecon`.

## Input formats

The input is a directory tree of JSON documents, one per published update. Three
kinds of document are recognized, from the file name when it carries a marker and
from the content otherwise:

* `kandidat-data` the candidate roster of a jurisdiction
* `valgresultater` the results of one polling area
* `mandatfordeling` the seat allocation of a jurisdiction

Files are read as UTF-8, with or without a byte-order mark. Any file whose path
contains `verifikation` is verification data and is ignored, as is any document
whose election date does not carry the cycle marker (`-2025` by default).

### schema-v2

Documents with a top-level `Valgart` field. Everything sits at the top level:

```text
{
  "Valgart": "Kommunalvalg",
  "Valgdag": "18-11-2025",
  "AfstemningsområdeDagiId": 7001,
  "Kommune": "Aarhus",
  "FrigivelsesTidspunktUTC": "2025-11-19T01:02:03Z",
  "GyldigeStemmer": 680,
  "Kandidatlister": [
    { "KandidatlisteId": "L1", "Navn": "...", "Stemmer": 680, "Listestemmer": 80,
      "Kandidater": [ { "Id": "C1", "Stemmeseddelnavn": "...", "Stemmer": 600 } ] }
  ]
}
```

`FrigivelsesTidspunktUTC` is the revision used to keep the newest update.
Mandates come as `PersonligeMandater`, `ListeMandater` and, for alternates,
`Kandidatliste[].Stedfortrædere`.

### schema-v1

Documents without `Valgart`. The body is nested under `Valg` or `Valgresultater`
(or sits at the top level) and refers to places, lists and candidates through
reference objects: `KommuneReference`, `RegionReference`,
`AfstemningsområdeReference`, `KandidatReference`, `KandidatlisteReference`.
Candidate names are split into `Fornavn` and `Efternavn`. These documents carry no
revision, so they are never deduplicated against each other.

Missing strings default to the empty string and missing counts to 0.

## Vote accounting

`Stemmer` on a list is the *total* of the party in the area: the personal votes of
all its candidates plus the list-only ballots (`Listestemmer`). The vote-result
table repeats that total on every candidate row of the party. It is counted once
per (polling area, party) everywhere, through
[`total_once_per_group`](crate::reconcile::total_once_per_group).

When the personal votes of a party exceed its total, the total is raised to the
personal votes (never beyond the valid votes of the area) and a warning is
recorded. Areas whose party totals do not add up to their valid votes, or where
a party's personal votes exceed the valid votes, are kept and flagged for review.

Every polling area is published several times. Only the newest publication of
an area is used, as a whole: a list that had no candidates in an older update
does not survive once a newer update of the area exists. Mandate distributions
are superseded per jurisdiction in the same way.

## Outputs

`valgrecon` writes, with stable names:

| file | content |
|------|---------|
| `candidates_{municipal,regional,all}.csv` | candidate roster |
| `vote_results_{municipal,regional,all}.csv` | one row per polling area and candidate |
| `mandates_{municipal,regional,all}.csv` | seats and alternates |
| `reconciled_area_party_{municipal,regional,all}.csv` | one row per polling area and party |
| `party_totals_by_jurisdiction.csv` | party totals and vote shares |
| `area_party_totals.csv` | party totals per polling area |
| `turnout_by_jurisdiction.csv` | turnout per jurisdiction and nationally |
| `gender_balance.csv` | candidate categories per party |
| `top_vote_getters.csv` | personal vote ranking |
| `robbed_candidates.csv` | candidates above their party's elected threshold |
| `dependency_ratio.csv` | share of the party total carried by one candidate |
| `strongholds.csv` | polling areas far above the party's jurisdiction share |
| `thin_majorities.csv` | seats of the executive's party against half the council |
| `aggregates.json` | every roll-up, for comparison between runs |
| `validation_report.json` | the consistency checks |
| `run_summary.json` | counts of skipped, filtered, flagged and failed items |

Percentages are kept at full precision and rounded half to even, to one
decimal, when written.

## Configuration

`valgrecon` comes with sensible defaults. A JSON file passed with `--config` may
override any of them:

```text
{
  "electionCycleMarker": "-2025",
  "verificationMarkers": ["verifikation"],
  "noiseFloor": 50,
  "dependencySaturationPercent": 99.9,
  "strongholdMinDeviation": 10.0,
  "strongholdMinMeanShare": 2.0,
  "robbedLimit": 100,
  "dependencyLimit": 100,
  "strongholdLimit": 200,
  "topVoteGetterLimit": 100,
  "partyAliases": { "Det Konservative Folkeparti": "Konservative" },
  "nationalTolerancePercent": 0.1,
  "partyTolerancePercent": 0.5
}
```

The executive roster (`--executives`) is a CSV file or the first worksheet of an
Excel file, with the header `Kommune,Navn,Parti`.

The official totals (`--reference-totals`) look as follows. Every value may be
left out or set to `null`; missing values are not checked.

```text
{
  "municipal": {
    "eligible": 4784749,
    "valid": 3256070,
    "turnoutPercent": 69.2,
    "parties": { "Socialdemokratiet": 754304 },
    "jurisdictions": {
      "Aarhus": { "Socialdemokratiet": 58123, "Venstre": null }
    }
  }
}
```

 */
